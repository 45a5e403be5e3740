use std::{collections::HashSet, sync::Arc};

use arc_swap::ArcSwap;
use kdam::{BarExt, tqdm};
use tracing::{debug, info};

use crate::{
    embedder::Embedder,
    embedding_cache::{CacheKey, EmbeddingCache},
    error::{Error, Result},
    listing::Listing,
    similarity::UnitMatrix,
};

/// Number of descriptions handed to the embedder per call.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Immutable pairing of a listing set with its description embeddings.
///
/// Row `i` of the matrix belongs to `listings()[i]`; that index is also the
/// dataset order the ranker uses to break ties. A snapshot is never mutated:
/// when the dataset changes, build a new one and [`SharedSnapshot::publish`]
/// it.
#[derive(Debug)]
pub struct ListingSnapshot {
    model_version: String,
    listings: Vec<Listing>,
    matrix: UnitMatrix,
}

fn validate_listings(listings: &[Listing]) -> Result<()> {
    let mut seen = HashSet::with_capacity(listings.len());
    for listing in listings {
        listing.validate()?;
        if !seen.insert(listing.id.as_str()) {
            return Err(Error::DuplicateListing(listing.id.clone()));
        }
    }
    Ok(())
}

impl ListingSnapshot {
    /// Embed (or fetch from `cache`) every description and pack the matrix.
    pub fn build<E: Embedder + ?Sized>(
        listings: Vec<Listing>,
        embedder: &mut E,
        cache: Option<&EmbeddingCache>,
    ) -> Result<Self> {
        validate_listings(&listings)?;
        let model = embedder.model_version().to_string();

        let keys: Vec<CacheKey<'_>> = listings
            .iter()
            .map(|l| CacheKey {
                listing_id: &l.id,
                description: &l.description,
            })
            .collect();
        let mut vectors = match cache {
            Some(cache) => cache.batch_load(&model, &keys)?,
            None => vec![None; listings.len()],
        };

        let misses: Vec<usize> = vectors
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect();
        info!(
            listings = listings.len(),
            cached = listings.len() - misses.len(),
            to_embed = misses.len(),
            model = %model,
            "building listing snapshot"
        );

        if !misses.is_empty() {
            let mut bar = tqdm!(
                total = misses.len(),
                desc = "Embedding descriptions",
                disable = misses.len() <= EMBED_BATCH_SIZE
            );

            for chunk in misses.chunks(EMBED_BATCH_SIZE) {
                let texts: Vec<String> = chunk
                    .iter()
                    .map(|&i| listings[i].description.clone())
                    .collect();
                let embedded = embedder.embed_documents(&texts)?;
                if embedded.len() != chunk.len() {
                    return Err(Error::Config(format!(
                        "embedder returned {} vectors for {} texts",
                        embedded.len(),
                        chunk.len()
                    )));
                }

                if let Some(cache) = cache {
                    let entries: Vec<(CacheKey<'_>, &[f32])> = chunk
                        .iter()
                        .zip(&embedded)
                        .map(|(&i, v)| (keys[i], v.as_slice()))
                        .collect();
                    cache.batch_store(&model, &entries)?;
                }

                for (&i, v) in chunk.iter().zip(embedded) {
                    vectors[i] = Some(v);
                }
                bar.update(chunk.len())?;
            }
        }

        let vectors: Vec<Vec<f32>> = vectors.into_iter().flatten().collect();
        Self::from_vectors(model, listings, vectors)
    }

    /// Assemble a snapshot from vectors computed elsewhere.
    ///
    /// `vectors[i]` must be the description embedding of `listings[i]`.
    pub fn from_vectors(
        model_version: impl Into<String>,
        listings: Vec<Listing>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        validate_listings(&listings)?;
        if vectors.len() != listings.len() {
            return Err(Error::Config(format!(
                "{} embeddings supplied for {} listings",
                vectors.len(),
                listings.len()
            )));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        let matrix = UnitMatrix::from_vectors(&vectors, dimension)?;
        debug!(
            rows = matrix.len(),
            dimension,
            degenerate = matrix.degenerate_count(),
            "packed embedding matrix"
        );

        Ok(Self {
            model_version: model_version.into(),
            listings,
            matrix,
        })
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn matrix(&self) -> &UnitMatrix {
        &self.matrix
    }

    pub fn dimension(&self) -> usize {
        self.matrix.dimension()
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

/// Publication point for the current snapshot.
///
/// Readers take an `Arc` and keep ranking against it even if a newer
/// snapshot is published meanwhile.
pub struct SharedSnapshot {
    current: ArcSwap<ListingSnapshot>,
}

impl SharedSnapshot {
    pub fn new(snapshot: ListingSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn current(&self) -> Arc<ListingSnapshot> {
        self.current.load_full()
    }

    /// Swap in `snapshot`, returning the one it replaces.
    pub fn publish(&self, snapshot: ListingSnapshot) -> Arc<ListingSnapshot> {
        self.current.swap(Arc::new(snapshot))
    }
}

impl std::fmt::Debug for SharedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSnapshot")
            .field("current", &*self.current.load())
            .finish()
    }
}
