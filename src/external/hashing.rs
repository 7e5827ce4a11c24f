use sha2::{Digest, Sha256};

#[cfg(test)]
use mockall::automock;

/// Deterministic digest of report bytes, persisted with each decision for
/// tamper evidence.
#[cfg_attr(test, automock)]
pub trait ContentHasher: Send + Sync {
    fn digest(&self, content: &[u8]) -> String;
}

/// SHA-256, lower-case hex
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, content: &[u8]) -> String {
        hex::encode(Sha256::digest(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            Sha256Hasher.digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_is_lower_case_hex() {
        let digest = Sha256Hasher.digest(b"");
        assert_eq!(digest.len(), 64);
        assert!(digest.starts_with("e3b0c442"));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    proptest! {
        #[test]
        fn identical_bytes_identical_digest(content in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(Sha256Hasher.digest(&content), Sha256Hasher.digest(&content.clone()));
        }

        #[test]
        fn different_bytes_different_digest(
            a in proptest::collection::vec(any::<u8>(), 0..256),
            b in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(Sha256Hasher.digest(&a), Sha256Hasher.digest(&b));
        }
    }
}
