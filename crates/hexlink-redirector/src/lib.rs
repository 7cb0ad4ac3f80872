//! Redirector service library.
//!
//! [`RedirectorService`] resolves short codes to their original URLs through
//! a read-only [`hexlink_core::ReadStore`]. Soft-deleted records are never
//! resolved.

pub mod error;
pub mod redirector;
pub mod service;

pub use error::{RedirectorError, Result};
pub use redirector::Redirector;
pub use service::RedirectorService;
