//! One-shot completion shared by the envelope, the queue and waiting callers.

use std::time::Duration;

use courier_core::ResponseData;
use tokio::sync::watch;

/// Terminal signal of one envelope.
#[derive(Debug, Clone)]
pub enum Outcome<R, E = ()> {
    /// The response was received and decoded.
    Response(ResponseData<R, E>),
    /// The transport failed, the server answered with an error status or the
    /// body could not be decoded.
    Error(ResponseData<R, E>),
    /// The envelope was cancelled before delivery.
    Cancelled,
}

impl<R, E> Outcome<R, E> {
    /// Result data, `None` for a cancelled envelope.
    pub fn into_data(self) -> Option<ResponseData<R, E>> {
        match self {
            Outcome::Response(data) | Outcome::Error(data) => Some(data),
            Outcome::Cancelled => None,
        }
    }

    /// Whether this is [`Outcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

/// Single-assignment slot backed by a `watch` channel.
///
/// Only the first [`complete`](OneShot::complete) stores a value; every later
/// call is a no-op. Any number of [`Pending`] handles observe the value.
#[derive(Debug)]
pub struct OneShot<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OneShot<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Stores the value unless one is already held.
    ///
    /// Returns `true` when this call completed the slot.
    pub fn complete(&self, value: T) -> bool {
        self.tx.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    /// Whether a value has been stored.
    pub fn is_completed(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Handle to wait for the value.
    pub fn subscribe(&self) -> Pending<T> {
        Pending {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer side of a [`OneShot`].
///
/// Await it with [`wait`](Pending::wait) inside a runtime or block the
/// current thread with [`wait_blocking`](Pending::wait_blocking).
#[derive(Debug, Clone)]
pub struct Pending<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Pending<T> {
    /// Waits for the value.
    ///
    /// Returns `None` if the slot was dropped without being completed.
    pub async fn wait(&mut self) -> Option<T> {
        self.rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|slot| (*slot).clone())
    }

    /// Waits for the value for at most `timeout`.
    ///
    /// Returns `None` on expiry or when the slot was dropped.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .ok()
            .flatten()
    }

    /// Blocks the current thread until the value is available.
    ///
    /// Must not be called from an async context.
    pub fn wait_blocking(&mut self) -> Option<T> {
        futures::executor::block_on(self.wait())
    }

    /// Current value without waiting.
    pub fn peek(&self) -> Option<T> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_first_completion_is_kept() {
        let slot = OneShot::new();
        assert!(!slot.is_completed());
        assert!(slot.complete(1));
        assert!(!slot.complete(2));
        assert!(slot.is_completed());
        assert_eq!(slot.subscribe().peek(), Some(1));
    }

    #[tokio::test]
    async fn test_wait_sees_value_completed_before_subscribe() {
        let slot = OneShot::new();
        slot.complete("done");
        assert_eq!(slot.subscribe().wait().await, Some("done"));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_completion() {
        let slot = std::sync::Arc::new(OneShot::new());
        let mut pending = slot.subscribe();

        let writer = slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.complete(7u32);
        });

        assert_eq!(pending.wait().await, Some(7));
    }

    #[tokio::test]
    async fn test_dropped_slot_resolves_to_none() {
        let slot = OneShot::<u8>::new();
        let mut pending = slot.subscribe();
        drop(slot);
        assert_eq!(pending.wait().await, None);
    }

    #[tokio::test]
    async fn test_wait_timeout_expires() {
        let slot = OneShot::<u8>::new();
        let mut pending = slot.subscribe();
        assert_eq!(pending.wait_timeout(Duration::from_millis(5)).await, None);
    }

    #[test]
    fn test_wait_blocking_from_plain_thread() {
        let slot = std::sync::Arc::new(OneShot::new());
        let mut pending = slot.subscribe();

        let writer = slot.clone();
        let handle = std::thread::spawn(move || writer.complete(String::from("ok")));

        assert_eq!(pending.wait_blocking().as_deref(), Some("ok"));
        assert!(handle.join().unwrap());
    }
}
