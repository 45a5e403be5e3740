use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
    backends::InMemoryBackend,
};

use crate::{embedder::fnv1a, error::Result};

/// Key: `(model_version, listing_id)`.
const EMBEDDINGS: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("description_embeddings");

/// Header size: 8 bytes description fingerprint + 4 bytes dimension.
const HEADER_SIZE: usize = 12;

/// Process-local store of description embeddings, so rebuilding a snapshot
/// only embeds listings that are new or whose description changed.
///
/// Binary format per entry:
/// - 8 bytes: FNV-1a fingerprint of the description (u64 LE)
/// - 4 bytes: embedding dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
///
/// An entry whose fingerprint does not match the current description is
/// treated as missing.
pub struct EmbeddingCache {
    db: Database,
}

fn encode(dest: &mut [u8], fingerprint: u64, vector: &[f32]) {
    dest[0..8].copy_from_slice(&fingerprint.to_le_bytes());
    dest[8..HEADER_SIZE].copy_from_slice(&(vector.len() as u32).to_le_bytes());
    dest[HEADER_SIZE..].copy_from_slice(bytemuck::cast_slice(vector));
}

fn decode(bytes: &[u8], fingerprint: u64) -> Option<Vec<f32>> {
    let stored: [u8; 8] = bytes.get(0..8)?.try_into().ok()?;
    if u64::from_le_bytes(stored) != fingerprint {
        return None;
    }
    let header: [u8; 4] = bytes.get(8..HEADER_SIZE)?.try_into().ok()?;
    let dimension = u32::from_le_bytes(header) as usize;
    let body = &bytes[HEADER_SIZE..];
    if body.len() != dimension * 4 {
        return None;
    }
    // Values may be unaligned inside the page, so copy via pod_collect.
    Some(bytemuck::pod_collect_to_vec(body))
}

/// One description and its id, as looked up or stored in the cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    pub listing_id: &'a str,
    pub description: &'a str,
}

impl EmbeddingCache {
    /// Create an empty cache.
    ///
    /// # Examples
    ///
    /// ```
    /// use rentrank::EmbeddingCache;
    /// use rentrank::embedding_cache::CacheKey;
    ///
    /// let cache = EmbeddingCache::in_memory().unwrap();
    /// let key = CacheKey { listing_id: "7", description: "garden flat" };
    /// cache.store("m", key, &[1.0, 0.0]).unwrap();
    /// assert_eq!(cache.load("m", key).unwrap(), Some(vec![1.0, 0.0]));
    /// ```
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;

        let txn = db.begin_write()?;
        txn.open_table(EMBEDDINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn store(&self, model: &str, key: CacheKey<'_>, vector: &[f32]) -> Result<()> {
        self.batch_store(model, &[(key, vector)])
    }

    /// Store many vectors for one model in a single transaction.
    pub fn batch_store(&self, model: &str, entries: &[(CacheKey<'_>, &[f32])]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(EMBEDDINGS)?;
            for (key, vector) in entries {
                let byte_len = HEADER_SIZE + std::mem::size_of_val(*vector);
                let mut guard =
                    table.insert_reserve((model, key.listing_id), byte_len)?;
                encode(guard.as_mut(), fnv1a(key.description.as_bytes()), vector);
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Returns None if the listing has no current entry for `model`.
    pub fn load(&self, model: &str, key: CacheKey<'_>) -> Result<Option<Vec<f32>>> {
        Ok(self.batch_load(model, &[key])?.pop().flatten())
    }

    /// Load many vectors in one read transaction, preserving input order.
    pub fn batch_load(
        &self,
        model: &str,
        keys: &[CacheKey<'_>],
    ) -> Result<Vec<Option<Vec<f32>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let fingerprint = fnv1a(key.description.as_bytes());
            let vector = table
                .get((model, key.listing_id))?
                .and_then(|guard| decode(guard.value(), fingerprint));
            results.push(vector);
        }
        Ok(results)
    }

    /// Total number of cached vectors across all models.
    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(EMBEDDINGS)?;
        Ok(table.len()?)
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key<'a>(listing_id: &'a str, description: &'a str) -> CacheKey<'a> {
        CacheKey {
            listing_id,
            description,
        }
    }

    #[test]
    fn store_and_load() {
        let cache = EmbeddingCache::in_memory().unwrap();
        cache.store("m1", key("42", "loft"), &[0.5, -1.0, 2.0]).unwrap();
        assert_eq!(
            cache.load("m1", key("42", "loft")).unwrap(),
            Some(vec![0.5, -1.0, 2.0])
        );
    }

    #[test]
    fn models_are_isolated() {
        let cache = EmbeddingCache::in_memory().unwrap();
        cache.store("m1", key("42", "loft"), &[1.0]).unwrap();
        assert!(cache.load("m2", key("42", "loft")).unwrap().is_none());
    }

    #[test]
    fn changed_description_is_a_miss() {
        let cache = EmbeddingCache::in_memory().unwrap();
        cache.store("m", key("1", "old text"), &[1.0]).unwrap();
        assert!(cache.load("m", key("1", "new text")).unwrap().is_none());
    }

    #[test]
    fn batch_load_preserves_order() {
        let cache = EmbeddingCache::in_memory().unwrap();
        cache
            .batch_store(
                "m",
                &[
                    (key("a", "first"), &[1.0, 2.0][..]),
                    (key("c", "third"), &[3.0, 4.0][..]),
                ],
            )
            .unwrap();

        let results = cache
            .batch_load("m", &[key("c", "third"), key("b", "second"), key("a", "first")])
            .unwrap();
        assert_eq!(results[0], Some(vec![3.0, 4.0]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], Some(vec![1.0, 2.0]));
    }

    #[test]
    fn len_counts_every_model() {
        let cache = EmbeddingCache::in_memory().unwrap();
        cache.store("old", key("1", "a"), &[1.0]).unwrap();
        cache.store("old", key("2", "b"), &[2.0]).unwrap();
        cache.store("new", key("1", "a"), &[3.0]).unwrap();
        assert_eq!(cache.len().unwrap(), 3);
    }

    #[test]
    fn overwrite_entry() {
        let cache = EmbeddingCache::in_memory().unwrap();
        cache.store("m", key("1", "x"), &[1.0]).unwrap();
        cache.store("m", key("1", "x"), &[2.0, 3.0]).unwrap();
        assert_eq!(cache.load("m", key("1", "x")).unwrap(), Some(vec![2.0, 3.0]));
    }

    #[test]
    fn corrupt_entry_reads_as_missing() {
        let fp = 9u64;
        let mut good = fp.to_le_bytes().to_vec();
        good.extend_from_slice(&[1, 0, 0, 0, 0, 0, 128, 63]);
        assert_eq!(decode(&good, fp), Some(vec![1.0]));
        assert!(decode(&good, fp + 1).is_none());
        assert!(decode(&good[..10], fp).is_none());

        let mut short = fp.to_le_bytes().to_vec();
        short.extend_from_slice(&[2, 0, 0, 0, 0, 0, 128, 63]);
        assert!(decode(&short, fp).is_none());
    }
}
