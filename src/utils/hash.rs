//! Content hashing for query-text deduplication

use sha1::{Digest, Sha1};

/// Lowercase hex SHA-1 of a query text; the dedup key of the full-text side
/// table and the `full_query_text_sha1` clustering column.
pub fn sha1_hex(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_hex_known_value() {
        // sha1("abc") test vector
        assert_eq!(sha1_hex("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_sha1_hex_is_stable() {
        let text = "SELECT * FROM orders WHERE customer_id = ?";
        assert_eq!(sha1_hex(text), sha1_hex(text));
        assert_eq!(sha1_hex(text).len(), 40);
    }
}
