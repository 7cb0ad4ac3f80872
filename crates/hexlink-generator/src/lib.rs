pub mod random;

pub use random::RandomHexGenerator;

use hexlink_core::ShortCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("short code length must be positive")]
    InvalidLength,
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),
}

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// Uniqueness against existing records is enforced by the store on save,
/// so a generator only has to make collisions unlikely.
pub trait Generator: Send + Sync + 'static {
    /// Generates a candidate short code from `length` units of entropy.
    fn generate(&self, length: usize) -> Result<ShortCode, GeneratorError>;
}

impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    fn generate(&self, length: usize) -> Result<ShortCode, GeneratorError> {
        (**self).generate(length)
    }
}
