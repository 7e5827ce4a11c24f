use rand::Rng;

#[cfg(test)]
use mockall::automock;

/// Bytes of entropy per invitation token (256 bits)
pub const TOKEN_BYTES: usize = 32;

#[cfg_attr(test, automock)]
pub trait TokenGenerator: Send + Sync {
    /// Opaque, high-entropy, hex-encoded token
    fn generate(&self) -> String;
}

/// Draws from the thread-local CSPRNG (ChaCha, OS-seeded)
pub struct SecureTokenGenerator;

impl TokenGenerator for SecureTokenGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_64_hex_chars() {
        let token = SecureTokenGenerator.generate();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..256).map(|_| SecureTokenGenerator.generate()).collect();
        assert_eq!(tokens.len(), 256);
    }
}
