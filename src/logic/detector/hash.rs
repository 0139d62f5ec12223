//! Content Hasher
//!
//! SHA-256 fingerprints for individual detector binaries and for the whole
//! active set (the "root hash"). Content-addressed, so digests are stable
//! across processes and machines for the same bytes.

use sha2::{Digest, Sha256};

/// Hex SHA-256 digest of one detector binary
pub fn hash_binary(binary: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(binary);
    hex::encode(hasher.finalize())
}

/// Root hash over per-binary digests, in the order supplied.
///
/// The digest covers the concatenation of the hex digests, so both content
/// and order changes are detected.
pub fn root_hash<S: AsRef<str>>(digests: &[S]) -> String {
    let mut hasher = Sha256::new();
    for digest in digests {
        hasher.update(digest.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Root hash over `(detector_id, digest)` pairs, sorted by detector id
/// before hashing. Used wherever digests come back from storage, so two
/// replicas agree even if their stores return rows in different orders.
pub fn root_hash_sorted(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let digests: Vec<&str> = sorted.iter().map(|(_, d)| d.as_str()).collect();
    root_hash(&digests)
}

/// Root hash of a set of raw binaries, in supplied order
pub fn root_hash_of_binaries(binaries: &[Vec<u8>]) -> String {
    let digests: Vec<String> = binaries.iter().map(|b| hash_binary(b)).collect();
    root_hash(&digests)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_binary_stable() {
        let digest = hash_binary(b"detector bytes");
        assert_eq!(digest, hash_binary(b"detector bytes"));
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_hash_binary_known_vector() {
        // SHA-256 of the empty input
        assert_eq!(
            hash_binary(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_root_hash_changes_with_content() {
        let a = root_hash_of_binaries(&[b"one".to_vec(), b"two".to_vec()]);
        let b = root_hash_of_binaries(&[b"one".to_vec(), b"two!".to_vec()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_root_hash_order_sensitive() {
        let d1 = hash_binary(b"one");
        let d2 = hash_binary(b"two");
        assert_ne!(root_hash(&[&d1, &d2]), root_hash(&[&d2, &d1]));
    }

    #[test]
    fn test_root_hash_reproducible() {
        let binaries = vec![b"one".to_vec(), b"two".to_vec()];
        assert_eq!(
            root_hash_of_binaries(&binaries),
            root_hash_of_binaries(&binaries)
        );
    }

    #[test]
    fn test_sorted_root_hash_ignores_storage_order() {
        let pairs_a = vec![
            ("alpha".to_string(), hash_binary(b"one")),
            ("beta".to_string(), hash_binary(b"two")),
        ];
        let pairs_b = vec![pairs_a[1].clone(), pairs_a[0].clone()];
        assert_eq!(root_hash_sorted(&pairs_a), root_hash_sorted(&pairs_b));
    }

    #[test]
    fn test_sorted_root_hash_matches_ordered_binaries() {
        // Repository rows sorted by id must agree with binaries loaded in
        // the same id order.
        let pairs = vec![
            ("alpha".to_string(), hash_binary(b"one")),
            ("beta".to_string(), hash_binary(b"two")),
        ];
        let from_binaries = root_hash_of_binaries(&[b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(root_hash_sorted(&pairs), from_binaries);
    }
}
