//! Content-addressed storage for certificates, photos and other evidence.
//! Records only ever hold the resulting [`ContentHash`]; nothing here runs
//! inside an invocation.
use super::error::{CustodyError, RecordKind};
use super::types::ContentHash;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub const EVIDENCE_TREE: &str = "evidence";

pub trait EvidenceStore {
    /// Stores `content` under its digest. Storing the same bytes twice yields
    /// the same hash.
    fn store(&self, content: &[u8]) -> Result<ContentHash, CustodyError>;
    fn retrieve(&self, hash: &ContentHash) -> Result<Vec<u8>, CustodyError>;
}

/// In-memory store for tests and tooling
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    blobs: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvidenceStore for MemoryEvidenceStore {
    fn store(&self, content: &[u8]) -> Result<ContentHash, CustodyError> {
        let hash = ContentHash::of(content);
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| CustodyError::State("evidence lock poisoned".into()))?;
        blobs.entry(hash.clone()).or_insert_with(|| content.to_vec());
        Ok(hash)
    }

    fn retrieve(&self, hash: &ContentHash) -> Result<Vec<u8>, CustodyError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| CustodyError::State("evidence lock poisoned".into()))?;
        blobs
            .get(hash)
            .cloned()
            .ok_or_else(|| CustodyError::not_found(RecordKind::Evidence, hash.as_str()))
    }
}

/// Evidence kept in its own tree next to the world state.
pub struct SledEvidenceStore {
    tree: sled::Tree,
}

impl SledEvidenceStore {
    pub fn open(db: &Arc<sled::Db>) -> Result<Self, sled::Error> {
        Ok(Self {
            tree: db.open_tree(EVIDENCE_TREE)?,
        })
    }
}

impl EvidenceStore for SledEvidenceStore {
    fn store(&self, content: &[u8]) -> Result<ContentHash, CustodyError> {
        let hash = ContentHash::of(content);
        self.tree
            .insert(hash.as_str().as_bytes(), content)
            .map_err(|err| CustodyError::State(err.to_string()))?;

        tracing::debug!(hash = %hash, bytes = content.len(), "stored evidence");
        Ok(hash)
    }

    fn retrieve(&self, hash: &ContentHash) -> Result<Vec<u8>, CustodyError> {
        self.tree
            .get(hash.as_str().as_bytes())
            .map_err(|err| CustodyError::State(err.to_string()))?
            .map(|blob| blob.to_vec())
            .ok_or_else(|| CustodyError::not_found(RecordKind::Evidence, hash.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_idempotent() {
        let store = MemoryEvidenceStore::new();

        let first = store.store(b"batch photo").unwrap();
        let second = store.store(b"batch photo").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.retrieve(&first).unwrap(), b"batch photo".to_vec());
    }

    #[test]
    fn unknown_hash_is_not_found() {
        let store = MemoryEvidenceStore::new();
        let missing = ContentHash::of(b"never stored");

        let err = store.retrieve(&missing).unwrap_err();
        assert!(matches!(err, CustodyError::NotFound { kind: RecordKind::Evidence, .. }));
    }

    #[test]
    fn sled_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(sled::open(dir.path().join("evidence.db")).unwrap());
        let store = SledEvidenceStore::open(&db).unwrap();

        let hash = store.store(b"certificate").unwrap();
        assert_eq!(hash, ContentHash::of(b"certificate"));
        assert_eq!(store.retrieve(&hash).unwrap(), b"certificate".to_vec());
    }
}
