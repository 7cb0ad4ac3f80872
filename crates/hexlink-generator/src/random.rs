use crate::{Generator, GeneratorError};
use hexlink_core::ShortCode;

/// Short code generator backed by the operating system CSPRNG.
///
/// `generate(n)` reads `n` random bytes and returns their lowercase hex
/// encoding, so codes are `2 * n` characters long.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomHexGenerator;

impl RandomHexGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Generator for RandomHexGenerator {
    fn generate(&self, length: usize) -> Result<ShortCode, GeneratorError> {
        if length == 0 {
            return Err(GeneratorError::InvalidLength);
        }

        let mut buffer = vec![0u8; length];
        getrandom::fill(&mut buffer)
            .map_err(|e| GeneratorError::EntropyUnavailable(e.to_string()))?;

        Ok(ShortCode::new_unchecked(hex::encode(buffer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn produces_twice_the_byte_length() {
        let generator = RandomHexGenerator::new();

        assert_eq!(generator.generate(4).unwrap().as_str().len(), 8);
        assert_eq!(generator.generate(8).unwrap().as_str().len(), 16);
    }

    #[test]
    fn produces_lowercase_hex() {
        let code = RandomHexGenerator::new().generate(16).unwrap();

        assert!(code
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn produces_valid_short_codes() {
        let code = RandomHexGenerator::new().generate(4).unwrap();
        assert!(ShortCode::new(code.as_str()).is_ok());
    }

    #[test]
    fn rejects_zero_length() {
        let err = RandomHexGenerator::new().generate(0).unwrap_err();
        assert_eq!(err, GeneratorError::InvalidLength);
    }

    #[test]
    fn codes_do_not_repeat() {
        let generator = RandomHexGenerator::new();
        let codes: HashSet<_> = (0..1000)
            .map(|_| generator.generate(8).unwrap().into_inner())
            .collect();

        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RandomHexGenerator>();
    }
}
