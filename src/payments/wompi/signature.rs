//! Integrity signature attached to every transaction.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `reference ‖ amount_in_cents ‖ currency ‖ secret`.
pub fn integrity_signature(reference: &str, amount_in_cents: i64, currency: &str, integrity_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    hasher.update(amount_in_cents.to_string().as_bytes());
    hasher.update(currency.as_bytes());
    hasher.update(integrity_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // sha256("0")
        assert_eq!(integrity_signature("", 0, "", ""), "5feceb66ffc86f38d952786c6d696c79c2dbc239dd4e91b46729d73a27fb57e9");
    }

    #[test]
    fn test_concatenation_order() {
        let sig = integrity_signature("sk8-438k4", 2_490_000, "COP", "test_integrity_secret");
        let mut hasher = Sha256::new();
        hasher.update(b"sk8-438k42490000COPtest_integrity_secret");
        assert_eq!(sig, format!("{:x}", hasher.finalize()));
        assert_eq!(sig.len(), 64);
        assert_ne!(sig, integrity_signature("sk8-438k4", 2_490_000, "COP", "other_secret"));
    }
}
