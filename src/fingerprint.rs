//! Content fingerprints for change detection.
//!
//! A fingerprint is the SHA-256 of the normalized title and body. Normalization
//! drops presentational whitespace so that no-op edits do not re-upload a note.

use sha2::{Digest, Sha256};

/// Separates title and body inside the digest so `("ab", "c")` and
/// `("a", "bc")` never collide.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Normalize text for hashing: unify line endings, strip trailing whitespace
/// on every line, and trim the whole string.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.lines().map(|line| line.trim_end()).collect();
    lines.join("\n").trim().to_string()
}

/// Compute the hex-encoded content hash of a note.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(title).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize(body).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short, stable hash of an identifier (used for upload file names).
pub fn short_id_hash(local_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(local_id.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    full[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        let a = content_hash("Groceries", "milk\neggs");
        let b = content_hash("Groceries", "milk\neggs");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn known_digest_does_not_drift() {
        // Guards against accidental changes to normalization or the separator.
        let mut hasher = Sha256::new();
        hasher.update(b"t\x1fb");
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(content_hash("  t ", "b\n\n"), expected);
    }

    #[test]
    fn whitespace_only_edits_do_not_change_hash() {
        let a = content_hash("Title", "line one\nline two");
        let b = content_hash("  Title\n", "line one   \r\nline two\n\n");
        assert_eq!(a, b);
    }

    #[test]
    fn content_edits_change_hash() {
        let a = content_hash("Title", "line one");
        let b = content_hash("Title", "line 1");
        assert_ne!(a, b);
    }

    #[test]
    fn title_body_boundary_matters() {
        assert_ne!(content_hash("ab", "c"), content_hash("a", "bc"));
    }

    #[test]
    fn normalize_keeps_inner_blank_lines() {
        assert_eq!(normalize("\n a \n\n b \n"), "a\n\n b");
    }

    #[test]
    fn short_id_hash_is_sixteen_hex_chars() {
        let h = short_id_hash("x-coredata://ABC/ICNote/p12");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
