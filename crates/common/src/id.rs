//! ID generation utilities.

use rand::RngCore;
use ulid::Ulid;
use uuid::Uuid;

/// ID generator for records, watch channels and shared secrets.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new lowercase ULID.
    ///
    /// Delivery records use these so that id order follows send order
    /// at millisecond resolution.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate an id for a provider watch channel.
    ///
    /// Calendar providers accept `[A-Za-z0-9\-_+/=]` up to 64 chars; a
    /// hyphenated UUID v4 fits.
    #[must_use]
    pub fn generate_channel_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Generate a 256-bit random secret, hex encoded.
    #[must_use]
    pub fn generate_secret(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_ne!(id1, id2);
        assert_eq!(id1, id1.to_lowercase());
    }

    #[test]
    fn test_generate_channel_id() {
        let id = IdGenerator::new().generate_channel_id();
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn test_generate_secret() {
        let id_gen = IdGenerator::new();
        let secret = id_gen.generate_secret();

        assert_eq!(secret.len(), 64);
        assert_ne!(secret, id_gen.generate_secret());
    }
}
