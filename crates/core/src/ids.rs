//! Entity-identifier ordering/codec contract.
//!
//! `TxnManager::init` is handed one of each; upper layers pull them back
//! out via `TxnManager::id_comparator()` / `id_serializer()` to order and
//! encode the edits they accumulate on a bound transaction. The core
//! itself never calls either — it only carries and re-exposes them.

use std::cmp::Ordering;

/// Orders opaque entity identifiers.
///
/// Entity ids are treated as opaque byte strings throughout the core;
/// only the caller-supplied comparator knows how to compare them
/// meaningfully (e.g. by DN component, by numeric OID, ...).
pub trait IdComparator: Send + Sync {
    /// Compare two entity identifiers.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Encodes/decodes opaque entity identifiers for storage in log edits.
pub trait IdSerializer: Send + Sync {
    /// Encode an identifier to its wire representation.
    fn serialize(&self, id: &[u8]) -> Vec<u8>;

    /// Decode a wire representation back to an identifier.
    ///
    /// Returns `None` on malformed input.
    fn deserialize(&self, bytes: &[u8]) -> Option<Vec<u8>>;
}

/// Default [`IdComparator`]: plain lexical ordering on the raw bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteLexicalComparator;

impl IdComparator for ByteLexicalComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Default [`IdSerializer`]: identity codec — the id's bytes are its own
/// wire representation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawIdSerializer;

impl IdSerializer for RawIdSerializer {
    fn serialize(&self, id: &[u8]) -> Vec<u8> {
        id.to_vec()
    }

    fn deserialize(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        Some(bytes.to_vec())
    }
}
