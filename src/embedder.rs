use rayon::prelude::*;

use crate::error::Result;

/// Text-to-vector capability consumed by the ranker.
///
/// Implementations must be deterministic for a given
/// [`model_version`](Embedder::model_version): two vectors are only
/// comparable when produced under the same version string, which is also
/// the cache namespace for stored description embeddings.
///
/// Queries and listing descriptions are separate sides. An asymmetric model
/// may encode the same text differently on each side, so a query vector is
/// only ever compared against document vectors.
pub trait Embedder {
    fn model_version(&self) -> &str;

    /// Embed a search query.
    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Embed listing descriptions, one vector per text in input order.
    fn embed_documents(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn model_version(&self) -> &str {
        (**self).model_version()
    }

    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        (**self).embed_query(text)
    }

    fn embed_documents(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_documents(texts)
    }
}

pub const DEFAULT_HASH_DIMENSION: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Model-free embedder using signed FNV-1a feature hashing.
///
/// Each lowercase alphanumeric token adds `±1` to one bucket. Shared words
/// produce aligned vectors, so cosine similarity approximates term overlap.
/// Text without tokens embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    version: String,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            version: format!("fnv1a-hash-{dimension}"),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn model_version(&self) -> &str {
        &self.version
    }

    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn embed_documents(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let this = &*self;
        Ok(texts.par_iter().map(|t| this.vectorize(t)).collect())
    }
}
