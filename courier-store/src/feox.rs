use std::path::{Path, PathBuf};

use feoxdb::{FeoxError, FeoxStore};
use serde::Deserialize;
use tracing::debug;

use crate::store::WriteSet;
use crate::{Store, StoreError};

/// Disk-backed [`Store`] using FeOxDB.
///
/// FeOxDB has no transactions of its own: writes are staged in memory and
/// applied when a successful transaction ends, then flushed to disk. A
/// failure while applying leaves the writes before it in place.
///
/// ```no_run
/// use courier_store::{FeOxDbStore, StoreHandle};
///
/// let store = FeOxDbStore::builder()
///     .path("/var/cache/myapp")
///     .max_file_size(1024 * 1024 * 1024)  // 1 GB
///     .max_memory(64 * 1024 * 1024)       // 64 MB
///     .build()?;
/// let handle = StoreHandle::new(store);
/// # Ok::<(), courier_store::StoreError>(())
/// ```
pub struct FeOxDbStore {
    db: FeoxStore,
    transaction: Option<WriteSet>,
    open: bool,
}

impl std::fmt::Debug for FeOxDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeOxDbStore")
            .field("open", &self.open)
            .field("in_transaction", &self.transaction.is_some())
            .finish_non_exhaustive()
    }
}

impl FeOxDbStore {
    /// Starts building a store.
    pub fn builder() -> FeOxDbStoreBuilder {
        FeOxDbStoreBuilder::default()
    }

    /// Memory-only store. Data is lost when dropped.
    pub fn in_memory() -> Result<Self, StoreError> {
        FeOxDbStoreBuilder::default().build()
    }

    /// Forces pending writes to disk. No-op in memory-only mode.
    pub fn flush(&self) {
        self.db.flush();
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::NotOpen)
        }
    }

    fn apply(&mut self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        match value {
            Some(value) => {
                self.db.insert(key.as_bytes(), &value)?;
            }
            None => {
                if self.db.contains_key(key.as_bytes()) {
                    self.db.delete(key.as_bytes())?;
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`FeOxDbStore`].
///
/// Also deserializable, so a store can be described in configuration:
///
/// ```yaml
/// path: /var/cache/myapp
/// max_memory: 67108864
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeOxDbStoreBuilder {
    path: Option<PathBuf>,
    max_file_size: Option<u64>,
    max_memory: Option<usize>,
}

impl FeOxDbStoreBuilder {
    /// Enables persistent storage at the given path.
    ///
    /// If path is a directory, creates `courier.db` inside it.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Pre-allocated size and cap of the database file.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Limit on RAM usage. Writes fail once it is reached.
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Opens the database.
    pub fn build(self) -> Result<FeOxDbStore, StoreError> {
        let mut builder = FeoxStore::builder();

        if let Some(mut path) = self.path {
            if path.is_dir() {
                path.push("courier.db");
            }
            builder = builder.device_path(path.to_string_lossy().to_string());
        }
        if let Some(file_size) = self.max_file_size {
            builder = builder.file_size(file_size);
        }
        if let Some(memory) = self.max_memory {
            builder = builder.max_memory(memory);
        }

        Ok(FeOxDbStore {
            db: builder.build()?,
            transaction: None,
            open: false,
        })
    }
}

impl Store for FeOxDbStore {
    fn open(&mut self) -> Result<(), StoreError> {
        if self.open {
            return Err(StoreError::AlreadyOpen);
        }
        self.open = true;
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
        let Some(writes) = transaction.into_commit() else {
            debug!("Transaction rolled back");
            return Ok(());
        };
        let count = writes.len();
        for (key, value) in writes {
            self.apply(&key, value)?;
        }
        self.db.flush();
        debug!(writes = count, "Transaction committed");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_open()?;
        if let Some(staged) = self.transaction.as_ref().and_then(|tx| tx.staged(key)) {
            return Ok(staged.map(<[u8]>::to_vec));
        }
        match self.db.get(key.as_bytes()) {
            Ok(value) => Ok(Some(value)),
            Err(FeoxError::KeyNotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_open()?;
        match &mut self.transaction {
            Some(transaction) => {
                transaction.put(key, value);
                Ok(())
            }
            None => self.apply(key, Some(value)),
        }
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        let existed = self.get(key)?.is_some();
        match &mut self.transaction {
            Some(transaction) => transaction.remove(key),
            None => self.apply(key, None)?,
        }
        Ok(existed)
    }
}
