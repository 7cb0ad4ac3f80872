use crate::error::{Result, ShortenerError};
use typed_builder::TypedBuilder;

/// Random bytes per generated code; hex encoding doubles it to 8 characters.
pub const DEFAULT_CODE_LENGTH: usize = 4;
/// Save attempts per URL before giving up on collisions.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const MAX_CODE_LENGTH: usize = 32;

/// Settings for [`crate::ShortenerService`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerConfig {
    /// Address the short code is appended to, e.g. `http://localhost:8080`.
    #[builder(setter(into))]
    pub base_url: String,
    /// Number of random bytes per code.
    #[builder(default = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

impl ShortenerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ShortenerError::InvalidConfig(format!(
                "base url must start with 'http://' or 'https://', got '{}'",
                self.base_url
            )));
        }

        if self.code_length == 0 || self.code_length > MAX_CODE_LENGTH {
            return Err(ShortenerError::InvalidConfig(format!(
                "code length must be between 1 and {}, got {}",
                MAX_CODE_LENGTH, self.code_length
            )));
        }

        if self.max_attempts == 0 {
            return Err(ShortenerError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ShortenerConfig::builder()
            .base_url("http://localhost:8080")
            .build();

        assert_eq!(config.code_length, 4);
        assert_eq!(config.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation() {
        let mut config = ShortenerConfig::builder()
            .base_url("http://localhost:8080")
            .build();

        config.base_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());
        config.base_url = "https://s.example".to_string();

        config.code_length = 0;
        assert!(config.validate().is_err());
        config.code_length = 33;
        assert!(config.validate().is_err());
        config.code_length = 8;

        config.max_attempts = 0;
        assert!(config.validate().is_err());
        config.max_attempts = 1;

        assert!(config.validate().is_ok());
    }
}
