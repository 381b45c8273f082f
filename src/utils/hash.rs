// src/utils/hash.rs

use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 of `content`.
///
/// This is the identity of every quiz, question and answer, so it must
/// only ever see the exact source bytes.
pub fn sha1_hex(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// `true` for a 40 character lowercase hex string.
pub fn is_sha1_hex(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(sha1_hex("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(sha1_hex(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(sha1_hex("- [x] Yes"), sha1_hex("- [x] Yes"));
        assert_ne!(sha1_hex("- [x] Yes"), sha1_hex("- [ ] Yes"));
    }

    #[test]
    fn test_is_sha1_hex() {
        assert!(is_sha1_hex(&sha1_hex("anything")));
        assert!(!is_sha1_hex("A9993E364706816ABA3E25717850C26C9CD0D89D"));
        assert!(!is_sha1_hex("abc"));
        assert!(!is_sha1_hex(&"g".repeat(40)));
    }
}
