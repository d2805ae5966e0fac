use std::collections::HashMap;

use crate::store::WriteSet;
use crate::{Store, StoreError};

/// In-process [`Store`] backed by a hash map.
///
/// Transactions stage their writes and apply them on a successful end.
/// Keeps session statistics, which makes it the store of choice in tests.
///
/// ```
/// use courier_store::{MemoryStore, StoreHandle};
///
/// let handle = StoreHandle::new(MemoryStore::new());
/// handle.write(|tx| tx.put_value("greeting", "hello").map(|_| true))?;
///
/// let greeting: Option<String> = handle.read(|session| session.get_value("greeting"))?;
/// assert_eq!(greeting.as_deref(), Some("hello"));
/// # Ok::<(), courier_store::StoreError>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: HashMap<String, Vec<u8>>,
    transaction: Option<WriteSet>,
    open: bool,
    opens: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a session is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Whether a transaction is active.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Number of sessions opened so far.
    pub fn open_count(&self) -> usize {
        self.opens
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    /// Whether nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::NotOpen)
        }
    }
}

impl Store for MemoryStore {
    fn open(&mut self) -> Result<(), StoreError> {
        if self.open {
            return Err(StoreError::AlreadyOpen);
        }
        self.open = true;
        self.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        if self.transaction.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.transaction = Some(WriteSet::default());
        Ok(())
    }

    fn set_transaction_successful(&mut self) {
        if let Some(transaction) = &mut self.transaction {
            transaction.mark_successful();
        }
    }

    fn end_transaction(&mut self) -> Result<(), StoreError> {
        let transaction = self.transaction.take().ok_or(StoreError::NoTransaction)?;
        for (key, value) in transaction.into_commit().into_iter().flatten() {
            match value {
                Some(value) => self.committed.insert(key, value),
                None => self.committed.remove(&key),
            };
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_open()?;
        if let Some(staged) = self.transaction.as_ref().and_then(|tx| tx.staged(key)) {
            return Ok(staged.map(<[u8]>::to_vec));
        }
        Ok(self.committed.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_open()?;
        match &mut self.transaction {
            Some(transaction) => transaction.put(key, value),
            None => {
                self.committed.insert(key.to_owned(), value);
            }
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        let existed = self.get(key)?.is_some();
        match &mut self.transaction {
            Some(transaction) => transaction.remove(key),
            None => {
                self.committed.remove(key);
            }
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_open_session() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.get("k"), Err(StoreError::NotOpen)));
        assert!(matches!(store.begin_transaction(), Err(StoreError::NotOpen)));

        store.open().unwrap();
        assert!(matches!(store.open(), Err(StoreError::AlreadyOpen)));
        store.close();
        store.close();
        assert!(!store.is_open());
    }

    #[test]
    fn test_transactions_do_not_nest() {
        let mut store = MemoryStore::new();
        store.open().unwrap();
        store.begin_transaction().unwrap();
        assert!(matches!(
            store.begin_transaction(),
            Err(StoreError::TransactionActive)
        ));
        store.end_transaction().unwrap();
        assert!(matches!(store.end_transaction(), Err(StoreError::NoTransaction)));
    }

    #[test]
    fn test_unmarked_transaction_is_discarded() {
        let mut store = MemoryStore::new();
        store.open().unwrap();
        store.put("kept", b"1".to_vec()).unwrap();

        store.begin_transaction().unwrap();
        store.put("dropped", b"2".to_vec()).unwrap();
        assert!(store.remove("kept").unwrap());
        assert_eq!(store.get("kept").unwrap(), None);
        store.end_transaction().unwrap();

        assert_eq!(store.get("kept").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("dropped").unwrap(), None);
    }

    #[test]
    fn test_marked_transaction_is_applied() {
        let mut store = MemoryStore::new();
        store.open().unwrap();
        store.put("old", b"1".to_vec()).unwrap();

        store.begin_transaction().unwrap();
        store.put("new", b"2".to_vec()).unwrap();
        store.remove("old").unwrap();
        store.set_transaction_successful();
        store.end_transaction().unwrap();

        assert_eq!(store.get("new").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get("old").unwrap(), None);
        assert!(!store.remove("missing").unwrap());
    }
}
