//! Model fingerprints. A fingerprint is a SHA-256 hex digest identifying a
//! particular compilation source; it keys the scheduler and the cache. Large
//! buffers are fingerprinted by their first and last 512 KiB windows so that
//! multi-hundred-megabyte models do not pay a full hash on every build.

use sha2::{Digest, Sha256};

/// Window taken from each end of a large buffer.
pub const ID_WINDOW: usize = 512 * 1024;

/// Hex digest over a list of byte parts.
pub fn digest_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint of an in-memory buffer. Buffers up to 1 MiB hash whole; larger
/// ones hash their first and last [`ID_WINDOW`] bytes.
pub fn buffer_id(buffer: &[u8]) -> String {
    if buffer.len() <= 2 * ID_WINDOW {
        digest_parts(&[buffer])
    } else {
        let head = &buffer[..ID_WINDOW];
        let tail = &buffer[buffer.len() - ID_WINDOW..];
        digest_parts(&[head, tail])
    }
}

/// Derives the scheduler's 32-bit model id from a hex fingerprint.
pub fn model_id(fingerprint: &str) -> u32 {
    let word = fingerprint.get(..8).unwrap_or_default();
    u32::from_str_radix(word, 16).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let digest = digest_parts(&[b"abc"]);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_parts(&[b"abc"]));
        assert_ne!(digest, digest_parts(&[b"abd"]));
    }

    #[test]
    fn small_buffers_hash_whole() {
        let buffer = vec![7u8; 1024];
        assert_eq!(buffer_id(&buffer), digest_parts(&[&buffer]));
    }

    #[test]
    fn large_buffers_hash_windows_only() {
        let mut buffer = vec![0u8; 3 * ID_WINDOW];
        let id = buffer_id(&buffer);

        // A change in the middle is outside both windows.
        buffer[ID_WINDOW + 100] = 1;
        assert_eq!(buffer_id(&buffer), id);

        // A change in the tail window is seen.
        let len = buffer.len();
        buffer[len - 1] = 1;
        assert_ne!(buffer_id(&buffer), id);
    }

    #[test]
    fn model_id_uses_leading_word() {
        assert_eq!(model_id("00000001deadbeef"), 1);
        assert_eq!(model_id("ffffffff"), u32::MAX);
    }
}
