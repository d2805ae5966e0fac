//! Store contract and the scoped guards that drive it.
//!
//! A [`Store`] follows the open / begin / mark successful / end / close
//! lifecycle of an embedded database. Callers never drive it by hand: a
//! [`StoreHandle`] takes the process-wide lock, opens a [`Session`] and,
//! for writes, a [`Transaction`]. Both guards release the store on drop, so
//! a failing or panicking writer still ends its transaction (rolling it
//! back) and closes the store.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use bincode::config::standard as bincode_config;
use bincode::serde::{decode_from_slice, encode_to_vec};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::StoreError;

/// Transactional key-value store.
///
/// Writes made between [`begin_transaction`](Store::begin_transaction) and
/// [`end_transaction`](Store::end_transaction) are kept only if
/// [`set_transaction_successful`](Store::set_transaction_successful) was
/// called in between. Reads inside a transaction see its own writes.
pub trait Store: Send + 'static {
    /// Opens the store for a session.
    fn open(&mut self) -> Result<(), StoreError>;

    /// Closes the current session. Closing a closed store is a no-op.
    fn close(&mut self);

    /// Starts a transaction. Transactions do not nest.
    fn begin_transaction(&mut self) -> Result<(), StoreError>;

    /// Marks the current transaction for commit.
    fn set_transaction_successful(&mut self);

    /// Ends the current transaction, committing it if it was marked
    /// successful and discarding its writes otherwise.
    fn end_transaction(&mut self) -> Result<(), StoreError>;

    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value.
    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Deletes a value, returning whether it existed.
    fn remove(&mut self, key: &str) -> Result<bool, StoreError>;
}

/// Writes staged by an open transaction. `None` marks a deletion.
#[derive(Debug, Default)]
pub(crate) struct WriteSet {
    entries: HashMap<String, Option<Vec<u8>>>,
    successful: bool,
}

impl WriteSet {
    pub(crate) fn staged(&self, key: &str) -> Option<Option<&[u8]>> {
        self.entries.get(key).map(Option::as_deref)
    }

    pub(crate) fn put(&mut self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_owned(), Some(value));
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.entries.insert(key.to_owned(), None);
    }

    pub(crate) fn mark_successful(&mut self) {
        self.successful = true;
    }

    /// Writes to apply, or `None` when the transaction rolls back.
    pub(crate) fn into_commit(self) -> Option<HashMap<String, Option<Vec<u8>>>> {
        self.successful.then_some(self.entries)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = decode_from_slice(bytes, bincode_config())?;
    Ok(value)
}

/// An open store. Closes it on drop.
pub struct Session<'a, S: Store> {
    store: &'a mut S,
}

impl<'a, S: Store> Session<'a, S> {
    fn open(store: &'a mut S) -> Result<Self, StoreError> {
        store.open()?;
        Ok(Self { store })
    }

    /// Reads raw bytes.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(key)
    }

    /// Reads a bincode-encoded value.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.store
            .get(key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        self.store
    }
}

impl<S: Store> Drop for Session<'_, S> {
    fn drop(&mut self) {
        self.store.close();
    }
}

/// A transaction within a session.
///
/// Ended by [`StoreHandle::write`]; dropping it earlier rolls it back.
pub struct Transaction<'a, S: Store> {
    session: Session<'a, S>,
    ended: bool,
}

impl<'a, S: Store> Transaction<'a, S> {
    fn begin(mut session: Session<'a, S>) -> Result<Self, StoreError> {
        session.store.begin_transaction()?;
        Ok(Self {
            session,
            ended: false,
        })
    }

    /// Writes raw bytes.
    pub fn put(&mut self, key: &str, value: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        self.session.store.put(key, value.into())
    }

    /// Writes a value, bincode-encoded.
    pub fn put_value<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = encode_to_vec(value, bincode_config())?;
        self.session.store.put(key, bytes)
    }

    /// Deletes a value, returning whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        self.session.store.remove(key)
    }

    fn end(mut self, successful: bool) -> Result<(), StoreError> {
        self.ended = true;
        if successful {
            self.session.store.set_transaction_successful();
        }
        self.session.store.end_transaction()
    }
}

impl<'a, S: Store> Deref for Transaction<'a, S> {
    type Target = Session<'a, S>;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl<S: Store> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if let Err(error) = self.session.store.end_transaction() {
            warn!(%error, "Failed to roll back transaction");
        }
    }
}

/// Shared handle to a store, serializing every session on one lock.
///
/// Clones share the store and the lock. At most one session is open at any
/// time across all clones. The lock is not reentrant: calling back into the
/// same handle from inside [`read`](StoreHandle::read) or
/// [`write`](StoreHandle::write) deadlocks.
pub struct StoreHandle<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for StoreHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for StoreHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

impl<S: Store> StoreHandle<S> {
    /// Wraps a store.
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Runs `reader` in a session. Blocks while another session is open.
    pub fn read<T, F>(&self, reader: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Session<'_, S>) -> Result<T, StoreError>,
    {
        let mut store = self.inner.lock();
        let session = Session::open(&mut *store)?;
        reader(&session)
    }

    /// Runs `writer` in a transaction. Blocks while another session is open.
    ///
    /// The transaction commits only if the writer returns `Ok(true)`. Returns
    /// the writer's verdict, or the first error from the writer or the store.
    pub fn write<F>(&self, writer: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Transaction<'_, S>) -> Result<bool, StoreError>,
    {
        let mut store = self.inner.lock();
        let session = Session::open(&mut *store)?;
        let mut transaction = Transaction::begin(session)?;
        let successful = writer(&mut transaction)?;
        transaction.end(successful)?;
        Ok(successful)
    }

    /// Runs `f` on the store under the lock, without opening a session.
    pub fn inspect<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.inner.lock())
    }
}
