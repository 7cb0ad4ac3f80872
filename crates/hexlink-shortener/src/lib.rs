//! URL shortening service.
//!
//! [`ShortenerService`] combines a [`hexlink_generator::Generator`] with a
//! [`hexlink_core::RecordStore`] to implement get-or-create allocation of
//! short codes, for single URLs and for batches.

pub mod config;
pub mod error;
pub mod service;
pub mod shortener;

pub use config::ShortenerConfig;
pub use error::ShortenerError;
pub use service::ShortenerService;
pub use shortener::{BatchItem, BatchOutcome, ShortenRequest, Shortened, Shortener};
