//! Hybrid ranking: blend hard and semantic scores, threshold, sort.
//!
//! Ordering is `final_score` descending, then dataset position ascending
//! (the listing's row in the snapshot). Equal inputs therefore always yield
//! the same output order.

use serde::Serialize;
use tracing::debug;

use crate::{
    error::{Error, Result},
    hard_filter::HardFilterPolicy,
    listing::{Listing, Query},
    snapshot::ListingSnapshot,
};

/// Tolerance when checking that the two weights sum to one.
const WEIGHT_SUM_EPSILON: f32 = 1e-4;

/// `(w_hard, w_semantic)`, non-negative and summing to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    hard: f32,
    semantic: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            hard: 0.5,
            semantic: 0.5,
        }
    }
}

impl Weights {
    pub fn new(hard: f32, semantic: f32) -> Result<Self> {
        let valid = hard.is_finite()
            && semantic.is_finite()
            && hard >= 0.0
            && semantic >= 0.0
            && ((hard + semantic) - 1.0).abs() <= WEIGHT_SUM_EPSILON;
        if !valid {
            return Err(Error::InvalidWeights { hard, semantic });
        }
        Ok(Self { hard, semantic })
    }

    /// Weights from the hard share alone; the semantic share is the rest.
    pub fn from_hard(hard: f32) -> Result<Self> {
        Self::new(hard, 1.0 - hard)
    }

    pub fn hard(&self) -> f32 {
        self.hard
    }

    pub fn semantic(&self) -> f32 {
        self.semantic
    }

    pub fn blend(&self, hard_score: f32, semantic_score: f32) -> f32 {
        (self.hard * hard_score + self.semantic * semantic_score).clamp(0.0, 1.0)
    }
}

/// Everything the ranker needs besides the listings and the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankConfig {
    pub policy: HardFilterPolicy,
    pub weights: Weights,
    /// Minimum `final_score` (inclusive) for a listing to be returned.
    pub threshold: f32,
    /// Optional cap on the number of returned entries.
    pub top_k: Option<usize>,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            policy: HardFilterPolicy::default(),
            weights: Weights::default(),
            threshold: 0.7,
            top_k: None,
        }
    }
}

impl RankConfig {
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        // Thresholds above 1 are allowed and simply match nothing.
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(Error::InvalidThreshold(self.threshold));
        }
        if let Some(0) = self.top_k {
            return Err(Error::InvalidTopK(0));
        }
        Ok(())
    }
}

/// One listing with its component and final scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredListing<'a> {
    /// 1-based position in the ranked output.
    pub rank: usize,
    #[serde(flatten)]
    pub listing: &'a Listing,
    pub hard_score: f32,
    pub semantic_score: f32,
    pub final_score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult<'a> {
    pub entries: Vec<ScoredListing<'a>>,
    /// Number of listings at or above the threshold before the top-K cap.
    pub total_above_threshold: usize,
}

impl RankedResult<'_> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Rank every listing of `snapshot` against `query`.
///
/// `query_vector` is the query text's embedding from the same model that
/// produced the snapshot. An empty snapshot, or a threshold no listing
/// reaches, yields an empty result rather than an error.
pub fn rank<'a>(
    snapshot: &'a ListingSnapshot,
    query: &Query,
    query_vector: &[f32],
    config: &RankConfig,
) -> Result<RankedResult<'a>> {
    query.validate()?;
    config.validate()?;

    if snapshot.is_empty() {
        return Ok(RankedResult {
            entries: Vec::new(),
            total_above_threshold: 0,
        });
    }

    let semantic = snapshot.matrix().score_batch(query_vector)?;

    let mut scored: Vec<(usize, ScoredListing<'a>)> = snapshot
        .listings()
        .iter()
        .zip(semantic)
        .enumerate()
        .filter_map(|(position, (listing, semantic_score))| {
            let hard_score = config.policy.score_unchecked(listing, query);
            let final_score = config.weights.blend(hard_score, semantic_score);
            (final_score >= config.threshold).then_some((
                position,
                ScoredListing {
                    rank: 0,
                    listing,
                    hard_score,
                    semantic_score,
                    final_score,
                },
            ))
        })
        .collect();

    scored.sort_by(|(pa, a), (pb, b)| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| pa.cmp(pb))
    });

    let total_above_threshold = scored.len();
    let limit = config.top_k.unwrap_or(total_above_threshold);
    let entries: Vec<ScoredListing<'a>> = scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (_, mut entry))| {
            entry.rank = i + 1;
            entry
        })
        .collect();

    debug!(
        scored = snapshot.len(),
        above_threshold = total_above_threshold,
        returned = entries.len(),
        threshold = config.threshold,
        "ranked listings"
    );

    Ok(RankedResult {
        entries,
        total_above_threshold,
    })
}
