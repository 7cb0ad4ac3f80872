//! Record store backends.
//!
//! Every backend implements the [`RecordStore`] contract from
//! `hexlink_core`: an in-memory map, a file-snapshotted decorator over it,
//! and a MySQL-backed store.

pub mod file;
pub mod memory;
pub mod mysql;

pub use file::{FileStore, RestoreReport, SnapshotPolicy};
pub use hexlink_core::error::{Result, StorageError};
pub use hexlink_core::{ReadStore, RecordStore};
pub use memory::MemoryStore;
pub use mysql::MySqlStore;
