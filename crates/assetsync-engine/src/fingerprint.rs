//! Content fingerprints for idempotency checks.
//!
//! A fingerprint is a SHA-256 digest (64 hex characters) over the canonical
//! JSON of each record, concatenated in list order:
//!
//! ```text
//!   [ {b:2, a:1}, {c:3} ]  ->  {"a":1,"b":2}{"c":3}  ->  sha256  ->  hex
//! ```
//!
//! Keys inside a record are sorted, so column order from the source driver
//! never changes the digest. List order does; software sets are keyed by
//! application id (see [`crate::software::SoftwareSet`]) so they always hash
//! in sorted order.

use assetsync_registry::value::Record;
use sha2::{Digest, Sha256};

/// Fingerprint an ordered list of records.
#[must_use]
pub fn fingerprint<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.to_canonical_json().to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint a single record, as a one-element list.
#[must_use]
pub fn fingerprint_record(record: &Record) -> String {
    fingerprint(std::iter::once(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetsync_registry::value::FieldValue;

    fn laptop() -> Record {
        Record::new()
            .with("id", "A1")
            .with("name", "Laptop-1")
            .with("site", "HQ")
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let digest = fingerprint_record(&laptop());
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_list_digest() {
        let empty: Vec<Record> = Vec::new();
        assert_eq!(
            fingerprint(&empty),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_insertion_order_independent() {
        let mut shuffled = Record::new();
        shuffled.insert("site", "HQ");
        shuffled.insert("id", "A1");
        shuffled.insert("name", "Laptop-1");

        assert_eq!(fingerprint_record(&laptop()), fingerprint_record(&shuffled));
        assert_eq!(fingerprint_record(&shuffled), fingerprint_record(&shuffled));
    }

    #[test]
    fn test_value_change_changes_digest() {
        let moved = laptop().with("site", "Branch");
        assert_ne!(fingerprint_record(&laptop()), fingerprint_record(&moved));
    }

    #[test]
    fn test_null_differs_from_empty_text() {
        let null = Record::new().with("serial", FieldValue::Null);
        let empty = Record::new().with("serial", "");
        assert_ne!(fingerprint_record(&null), fingerprint_record(&empty));
    }

    #[test]
    fn test_list_order_dependent() {
        let a = Record::new().with("h_app_id", "1");
        let b = Record::new().with("h_app_id", "2");
        assert_ne!(fingerprint([&a, &b]), fingerprint([&b, &a]));
    }

    #[test]
    fn test_single_record_matches_one_element_list() {
        let record = laptop();
        assert_eq!(fingerprint_record(&record), fingerprint(vec![&record]));
    }
}
