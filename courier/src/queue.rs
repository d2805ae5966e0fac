//! Shared dispatch queue.
//!
//! The queue runs each envelope on the tokio runtime it was built in, bounded
//! by a semaphore. Equal envelopes enqueued while one of them is in flight
//! share its transport call; each receives the outcome through its own
//! format handlers.

use std::any::Any;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use courier_core::{NetworkResponse, TransportError};
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tracing::{Instrument, debug, info_span, warn};

use crate::config::{QueueConfig, TimeoutPolicy};
use crate::transport::{OutgoingRequest, Transport};

#[cfg(feature = "metrics")]
use crate::metrics::{
    REQUEST_DURATION, REQUESTS_ACTIVE, REQUESTS_DEDUPLICATED, REQUESTS_DELIVERED,
    REQUESTS_ENQUEUED, REQUESTS_FAILED, REQUESTS_TIMEOUT,
};

/// Type-erased envelope as seen by the queue.
///
/// Implemented by [`Request`](crate::Request) for every result and error
/// type. The queue never decodes bodies itself: it hands the raw outcome to
/// [`deliver_response`](Dispatch::deliver_response) or
/// [`deliver_error`](Dispatch::deliver_error).
pub trait Dispatch: Send + Sync + 'static {
    /// Wire form of the envelope.
    fn outgoing(&self) -> OutgoingRequest;

    /// Moves the envelope to the enqueued state.
    ///
    /// Returns `false` if it already completed or was cancelled.
    fn mark_enqueued(&self) -> bool;

    /// Whether the envelope was cancelled.
    fn is_cancelled(&self) -> bool;

    /// Decodes a 2xx response and completes the envelope.
    fn deliver_response(&self, response: &NetworkResponse);

    /// Completes the envelope with a failure.
    fn deliver_error(&self, error: &TransportError);

    /// Hash consistent with [`same_request`](Dispatch::same_request).
    fn dedup_hash(&self) -> u64;

    /// Whether `other` may share this envelope's transport call.
    fn same_request(&self, other: &dyn Dispatch) -> bool;

    /// Upcast for downcasting to the concrete envelope type.
    fn as_any(&self) -> &dyn Any;
}

/// One transport call and the envelopes waiting on it.
struct Flight {
    leader: Arc<dyn Dispatch>,
    followers: Vec<Arc<dyn Dispatch>>,
}

impl Flight {
    fn is_cancelled(&self) -> bool {
        self.leader.is_cancelled() && self.followers.iter().all(|f| f.is_cancelled())
    }

    fn into_recipients(self) -> Vec<Arc<dyn Dispatch>> {
        let mut recipients = Vec::with_capacity(self.followers.len() + 1);
        recipients.push(self.leader);
        recipients.extend(self.followers);
        recipients
    }
}

fn same_instance(a: &Arc<dyn Dispatch>, b: &Arc<dyn Dispatch>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct RequestQueueInner {
    config: QueueConfig,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    permits: Option<Arc<Semaphore>>,
    in_flight: DashMap<u64, Vec<Flight>>,
    active: AtomicUsize,
    idle: Notify,
}

/// Decrements the active count when a dispatch task ends, panics included.
struct ActiveGuard(Arc<RequestQueueInner>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
        #[cfg(feature = "metrics")]
        metrics::gauge!(*REQUESTS_ACTIVE).decrement(1.0);
    }
}

/// Dispatch queue shared by every envelope of an application.
///
/// Cloning is cheap; clones share transport, limits and in-flight state.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<RequestQueueInner>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("config", &self.inner.config)
            .field("active", &self.active_request_count())
            .field("in_flight_keys", &self.inner.in_flight.len())
            .finish()
    }
}

impl RequestQueue {
    /// Creates a queue on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime. Use
    /// [`with_runtime`](Self::with_runtime) to pass a handle explicitly.
    pub fn new<T: Transport>(transport: T, config: QueueConfig) -> Self {
        Self::with_runtime(Handle::current(), transport, config)
    }

    /// Creates a queue that spawns its work on `runtime`.
    pub fn with_runtime<T: Transport>(runtime: Handle, transport: T, config: QueueConfig) -> Self {
        let permits = config
            .max_concurrent_requests
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        Self {
            inner: Arc::new(RequestQueueInner {
                config,
                transport: Arc::new(transport),
                runtime,
                permits,
                in_flight: DashMap::new(),
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Runtime the queue spawns on.
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Enqueues an envelope.
    ///
    /// Returns `true` if a transport call was started for it, `false` if it
    /// joined an equal envelope in flight or had already completed.
    pub fn add(&self, request: Arc<dyn Dispatch>) -> bool {
        if !request.mark_enqueued() {
            debug!("Request already completed, not enqueued");
            return false;
        }
        #[cfg(feature = "metrics")]
        metrics::counter!(*REQUESTS_ENQUEUED).increment(1);

        let key = if self.inner.config.deduplicate {
            let hash = request.dedup_hash();
            let mut bucket = self.inner.in_flight.entry(hash).or_default();
            if let Some(flight) = bucket
                .iter_mut()
                .find(|flight| flight.leader.same_request(&*request))
            {
                debug!(hash, "Request deduplicated - equal request in flight");
                #[cfg(feature = "metrics")]
                metrics::counter!(*REQUESTS_DEDUPLICATED).increment(1);
                flight.followers.push(request);
                return false;
            }
            bucket.push(Flight {
                leader: Arc::clone(&request),
                followers: Vec::new(),
            });
            Some(hash)
        } else {
            None
        };

        self.spawn(request, key);
        true
    }

    /// Number of transport calls running or waiting for a slot.
    pub fn active_request_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Waits until no transport call is running.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.active_request_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits for idleness with a timeout.
    ///
    /// Returns `true` if the queue became idle within the timeout.
    pub async fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }

    fn spawn(&self, leader: Arc<dyn Dispatch>, key: Option<u64>) {
        let inner = Arc::clone(&self.inner);
        let outgoing = leader.outgoing();
        let span = info_span!(
            "courier_request",
            method = %outgoing.method,
            url = %outgoing.url,
        );

        inner.active.fetch_add(1, Ordering::AcqRel);
        #[cfg(feature = "metrics")]
        metrics::gauge!(*REQUESTS_ACTIVE).increment(1.0);
        let guard = ActiveGuard(Arc::clone(&inner));

        self.inner.runtime.spawn(
            async move {
                let _guard = guard;
                let _permit = match &inner.permits {
                    Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
                    None => None,
                };

                if inner.abandon_if_cancelled(&leader, key) {
                    debug!("Request cancelled before dispatch, skipping transport");
                    return;
                }

                let result = inner.execute(outgoing).await;
                for recipient in inner.take_recipients(&leader, key) {
                    if recipient.is_cancelled() {
                        debug!("Skipping delivery to cancelled request");
                        continue;
                    }
                    match &result {
                        Ok(response) => {
                            debug!(status = response.status, "Delivering response");
                            recipient.deliver_response(response);
                            #[cfg(feature = "metrics")]
                            metrics::counter!(*REQUESTS_DELIVERED).increment(1);
                        }
                        Err(error) => {
                            debug!(%error, "Delivering error");
                            recipient.deliver_error(error);
                            #[cfg(feature = "metrics")]
                            metrics::counter!(*REQUESTS_FAILED).increment(1);
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}

impl RequestQueueInner {
    async fn execute(&self, mut outgoing: OutgoingRequest) -> Result<NetworkResponse, TransportError> {
        let start = Instant::now();
        let result = match self.config.request_timeout {
            TimeoutPolicy::None => self.transport.execute(outgoing).await,
            TimeoutPolicy::Cancel(duration) => {
                outgoing.timeout = Some(duration);
                match tokio::time::timeout(duration, self.transport.execute(outgoing)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            timeout_ms = duration.as_millis(),
                            "Request cancelled due to timeout"
                        );
                        #[cfg(feature = "metrics")]
                        metrics::counter!(*REQUESTS_TIMEOUT).increment(1);
                        Err(TransportError::timeout(format!(
                            "no response within {}ms",
                            duration.as_millis()
                        )))
                    }
                }
            }
            TimeoutPolicy::Warn(duration) => {
                let result = self.transport.execute(outgoing).await;
                let elapsed = start.elapsed();
                if elapsed > duration {
                    warn!(
                        elapsed_ms = elapsed.as_millis(),
                        threshold_ms = duration.as_millis(),
                        "Request exceeded timeout threshold"
                    );
                }
                result
            }
        };
        #[cfg(feature = "metrics")]
        metrics::histogram!(*REQUEST_DURATION).record(start.elapsed().as_secs_f64());

        result.and_then(|response| {
            if response.is_success() || response.not_modified {
                Ok(response)
            } else {
                Err(TransportError::status(response))
            }
        })
    }

    /// Drops the flight if every envelope waiting on it was cancelled.
    fn abandon_if_cancelled(&self, leader: &Arc<dyn Dispatch>, key: Option<u64>) -> bool {
        let Some(hash) = key else {
            return leader.is_cancelled();
        };
        let abandoned = match self.in_flight.get_mut(&hash) {
            Some(mut bucket) => {
                match bucket.iter().position(|f| same_instance(&f.leader, leader)) {
                    Some(index) if bucket[index].is_cancelled() => {
                        bucket.swap_remove(index);
                        true
                    }
                    _ => false,
                }
            }
            None => leader.is_cancelled(),
        };
        if abandoned {
            self.in_flight.remove_if(&hash, |_, bucket| bucket.is_empty());
        }
        abandoned
    }

    /// Removes the flight and returns every envelope waiting on it.
    fn take_recipients(&self, leader: &Arc<dyn Dispatch>, key: Option<u64>) -> Vec<Arc<dyn Dispatch>> {
        let Some(hash) = key else {
            return vec![Arc::clone(leader)];
        };
        let flight = self.in_flight.get_mut(&hash).and_then(|mut bucket| {
            bucket
                .iter()
                .position(|f| same_instance(&f.leader, leader))
                .map(|index| bucket.swap_remove(index))
        });
        self.in_flight.remove_if(&hash, |_, bucket| bucket.is_empty());
        match flight {
            Some(flight) => flight.into_recipients(),
            None => vec![Arc::clone(leader)],
        }
    }
}
