//! Write-through response cache keyed by request tags.

use std::sync::Arc;

use courier::{
    ConfigurationError, FromPayload, OneShot, Pending, Request, RequestQueue, ResponseData, Tag,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{Instrument, debug, info_span, warn};

use crate::{Session, Store, StoreError, StoreHandle, Transaction};

/// Application side of a [`CacheManager`]: how to fetch one kind of item
/// and how to keep it in a store.
pub trait ItemManager: Send + Sync + 'static {
    /// Value kept in the store.
    type Value: Send + 'static;
    /// Caller-supplied parameters identifying what to fetch.
    type Params;
    /// Result type of the fetch request.
    type Result: FromPayload;
    /// Error type of the fetch request.
    type Error: FromPayload;

    /// Builds the request fetching the item described by `params`.
    fn request_for(
        &self,
        params: &Self::Params,
    ) -> Result<Request<Self::Result, Self::Error>, ConfigurationError>;

    /// Tag identifying the item described by `params`.
    fn tag_for(&self, params: &Self::Params) -> Tag;

    /// Extracts the value to keep from a successful response, if any.
    fn read_response(
        &self,
        data: ResponseData<Self::Result, Self::Error>,
        tag: &Tag,
    ) -> Option<Self::Value>;

    /// Writes `value` inside an open transaction.
    ///
    /// The transaction commits only if this returns `Ok(true)`.
    fn store_response<S: Store>(
        &self,
        transaction: &mut Transaction<'_, S>,
        value: &Self::Value,
        tag: &Tag,
    ) -> Result<bool, StoreError>;

    /// Reads the value kept for `tag`.
    fn restore_response<S: Store>(
        &self,
        session: &Session<'_, S>,
        tag: &Tag,
    ) -> Result<Option<Self::Value>, StoreError>;
}

/// A fetch started by [`CacheManager::fetch`].
#[derive(Debug)]
pub struct Fetch {
    tag: Tag,
    persisted: Pending<bool>,
}

impl Fetch {
    /// Tag of the fetched item.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Converts into the tag, leaving the fetch running.
    pub fn into_tag(self) -> Tag {
        self.tag
    }

    /// Waits for the fetch to finish.
    ///
    /// Returns `true` if a value was received and committed to the store.
    pub async fn persisted(mut self) -> bool {
        self.persisted.wait().await.unwrap_or(false)
    }
}

struct CacheManagerInner<M, S> {
    manager: M,
    store: StoreHandle<S>,
    queue: RequestQueue,
    fetches: DashMap<Tag, Arc<OneShot<bool>>>,
}

/// Fetches items through a [`RequestQueue`] and keeps them in a store.
///
/// Every store access goes through the shared [`StoreHandle`], so managers
/// sharing a handle never open overlapping sessions.
/// [`store_response`](CacheManager::store_response) and
/// [`restore_response`](CacheManager::restore_response) block on that lock;
/// from async code call them inside `spawn_blocking`, as
/// [`fetch`](CacheManager::fetch) does.
///
/// Cloning is cheap; clones share the item manager and in-flight fetches.
pub struct CacheManager<M, S> {
    inner: Arc<CacheManagerInner<M, S>>,
}

impl<M, S> Clone for CacheManager<M, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M, S> std::fmt::Debug for CacheManager<M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.inner.store)
            .field("queue", &self.inner.queue)
            .field("fetches", &self.inner.fetches.len())
            .finish()
    }
}

impl<M, S> CacheManager<M, S>
where
    M: ItemManager,
    S: Store,
{
    /// Creates a manager.
    pub fn new(manager: M, store: StoreHandle<S>, queue: RequestQueue) -> Self {
        Self {
            inner: Arc::new(CacheManagerInner {
                manager,
                store,
                queue,
                fetches: DashMap::new(),
            }),
        }
    }

    /// The item manager.
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// The store handle.
    pub fn store(&self) -> &StoreHandle<S> {
        &self.inner.store
    }

    /// The queue fetches are sent on.
    pub fn queue(&self) -> &RequestQueue {
        &self.inner.queue
    }

    /// Starts fetching the item described by `params` and returns its tag.
    ///
    /// The value is persisted in the background once it arrives.
    pub fn fetch_data(&self, params: &M::Params) -> Result<Tag, ConfigurationError> {
        self.fetch(params).map(Fetch::into_tag)
    }

    /// Starts fetching the item described by `params`.
    ///
    /// If a fetch for the same tag is still running, joins it instead of
    /// sending another request.
    pub fn fetch(&self, params: &M::Params) -> Result<Fetch, ConfigurationError> {
        let tag = self.inner.manager.tag_for(params);
        let request = Arc::new(self.inner.manager.request_for(params)?);

        let slot = match CacheManagerInner::register(&self.inner, &tag) {
            Registration::Joined(persisted) => return Ok(Fetch { tag, persisted }),
            Registration::Leader(slot) => slot,
        };
        let persisted = slot.subscribe();

        let inner = Arc::clone(&self.inner);
        let span = info_span!("courier_fetch", tag = %tag);
        let task_tag = tag.clone();
        self.inner.queue.runtime().spawn(
            async move {
                let stored = inner
                    .run_fetch(request, task_tag)
                    .await
                    .is_some_and(|(_, stored)| stored);
                slot.finish(stored);
            }
            .instrument(span),
        );

        Ok(Fetch { tag, persisted })
    }

    /// Fetches the item described by `params`, persists it and returns it.
    ///
    /// Returns `None` if the request failed, was cancelled, or its response
    /// carried nothing to keep. The value is returned even if persisting it
    /// failed.
    ///
    /// Counts as a running fetch for its tag. If one is already running, no
    /// request is sent: this waits for it and reads the persisted value back.
    pub async fn fetch_data_sync(
        &self,
        params: &M::Params,
    ) -> Result<Option<M::Value>, ConfigurationError> {
        let tag = self.inner.manager.tag_for(params);
        let request = Arc::new(self.inner.manager.request_for(params)?);
        let span = info_span!("courier_fetch", tag = %tag);

        match CacheManagerInner::register(&self.inner, &tag) {
            Registration::Joined(mut persisted) => {
                if !persisted.wait().instrument(span).await.unwrap_or(false) {
                    return Ok(None);
                }
                let inner = Arc::clone(&self.inner);
                match tokio::task::spawn_blocking(move || inner.restore_response(&tag)).await {
                    Ok(value) => Ok(value),
                    Err(error) => {
                        warn!(%error, "Restoring response panicked");
                        Ok(None)
                    }
                }
            }
            Registration::Leader(slot) => {
                let fetched = Arc::clone(&self.inner)
                    .run_fetch(request, tag)
                    .instrument(span)
                    .await;
                slot.finish(fetched.as_ref().is_some_and(|(_, stored)| *stored));
                Ok(fetched.map(|(value, _)| value))
            }
        }
    }

    /// Whether a fetch for `tag` is running.
    pub fn is_fetching(&self, tag: &Tag) -> bool {
        self.inner.fetches.contains_key(tag)
    }

    /// Number of fetches running.
    pub fn active_fetch_count(&self) -> usize {
        self.inner.fetches.len()
    }

    /// Writes `value` for `tag` in one transaction.
    ///
    /// Returns `true` if the transaction committed. Store failures are
    /// logged and reported as `false`.
    pub fn store_response(&self, value: &M::Value, tag: &Tag) -> bool {
        self.inner.store_response(value, tag)
    }

    /// Reads the value kept for `tag`.
    ///
    /// Store failures are logged and reported as `None`.
    pub fn restore_response(&self, tag: &Tag) -> Option<M::Value> {
        self.inner.restore_response(tag)
    }
}

enum Registration<M, S> {
    Leader(FetchSlot<M, S>),
    Joined(Pending<bool>),
}

/// In-flight entry owned by the fetch that sends the request.
///
/// Dropping it unregisters the fetch and releases joined callers with
/// `false`, so an abandoned fetch never stays registered.
struct FetchSlot<M, S> {
    inner: Arc<CacheManagerInner<M, S>>,
    tag: Tag,
    slot: Arc<OneShot<bool>>,
}

impl<M, S> FetchSlot<M, S> {
    fn subscribe(&self) -> Pending<bool> {
        self.slot.subscribe()
    }

    fn finish(self, stored: bool) {
        self.release(stored);
    }

    fn release(&self, stored: bool) {
        self.inner
            .fetches
            .remove_if(&self.tag, |_, slot| Arc::ptr_eq(slot, &self.slot));
        self.slot.complete(stored);
    }
}

impl<M, S> Drop for FetchSlot<M, S> {
    fn drop(&mut self) {
        // No-op after `finish`: the entry is gone and the slot completed.
        self.release(false);
    }
}

impl<M, S> CacheManagerInner<M, S>
where
    M: ItemManager,
    S: Store,
{
    fn register(this: &Arc<Self>, tag: &Tag) -> Registration<M, S> {
        match this.fetches.entry(tag.clone()) {
            Entry::Occupied(entry) => {
                debug!(%tag, "Fetch already in flight");
                Registration::Joined(entry.get().subscribe())
            }
            Entry::Vacant(entry) => {
                let slot = Arc::new(OneShot::new());
                entry.insert(Arc::clone(&slot));
                Registration::Leader(FetchSlot {
                    inner: Arc::clone(this),
                    tag: tag.clone(),
                    slot,
                })
            }
        }
    }

    fn restore_response(&self, tag: &Tag) -> Option<M::Value> {
        match self
            .store
            .read(|session| self.manager.restore_response(session, tag))
        {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, %tag, "Failed to restore response");
                None
            }
        }
    }

    fn store_response(&self, value: &M::Value, tag: &Tag) -> bool {
        match self
            .store
            .write(|transaction| self.manager.store_response(transaction, value, tag))
        {
            Ok(true) => {
                debug!(%tag, "Response stored");
                true
            }
            Ok(false) => {
                debug!(%tag, "Writer declined, transaction rolled back");
                false
            }
            Err(error) => {
                warn!(%error, %tag, "Failed to store response");
                false
            }
        }
    }

    /// Sends the request and persists what it returns.
    ///
    /// Yields the value and whether it was committed.
    async fn run_fetch(
        self: Arc<Self>,
        request: Arc<Request<M::Result, M::Error>>,
        tag: Tag,
    ) -> Option<(M::Value, bool)> {
        let Some(data) = request.perform_request(true, &self.queue).await else {
            debug!("Fetch cancelled");
            return None;
        };
        if !data.is_success() {
            debug!(status = ?data.status_code, "Fetch failed, nothing to persist");
            return None;
        }
        let Some(value) = self.manager.read_response(data, &tag) else {
            debug!("Response carried nothing to persist");
            return None;
        };

        let inner = Arc::clone(&self);
        match tokio::task::spawn_blocking(move || {
            let stored = inner.store_response(&value, &tag);
            (value, stored)
        })
        .await
        {
            Ok(fetched) => Some(fetched),
            Err(error) => {
                warn!(%error, "Persisting response panicked");
                None
            }
        }
    }
}
