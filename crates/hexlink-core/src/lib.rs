//! Core types and traits for the hexlink URL shortener.
//!
//! This crate provides the record model and the storage contract shared by
//! the shortener service, the redirector service and every store backend.

pub mod error;
pub mod record;
pub mod shortcode;
pub mod store;

pub use error::{CoreError, StorageError};
pub use record::Record;
pub use shortcode::ShortCode;
pub use store::{ReadStore, RecordStore};
