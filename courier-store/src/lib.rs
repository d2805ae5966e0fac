#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! Transactional response cache for courier requests.
//!
//! A [`CacheManager`] fetches items through a
//! [`RequestQueue`](courier::RequestQueue), keeps what it receives in a
//! [`Store`] and restores it later without touching the network. What to
//! fetch and how to lay it out in the store is described by an
//! [`ItemManager`].
//!
//! All store access goes through a [`StoreHandle`], which serializes
//! sessions on a single lock and drives the store's
//! open / begin / commit-or-rollback / close lifecycle with scoped guards.
//!
//! Two stores are provided: [`MemoryStore`] and the disk-backed
//! [`FeOxDbStore`].

mod error;
mod feox;
mod manager;
mod memory;
mod store;

pub use error::StoreError;
pub use feox::{FeOxDbStore, FeOxDbStoreBuilder};
pub use manager::{CacheManager, Fetch, ItemManager};
pub use memory::MemoryStore;
pub use store::{Session, Store, StoreHandle, Transaction};
