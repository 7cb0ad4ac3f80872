//! Disposable infrastructure for integration tests.
//!
//! Fixtures start a docker container on creation and stop it on drop.

pub mod error;
pub mod mysql;

pub use error::{Result, TestInfraError};
