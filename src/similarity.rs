//! Semantic score between a query embedding and listing embeddings.
//!
//! Raw cosine similarity lives in `[-1, 1]`; it is mapped onto `[0, 1]` with
//! the fixed transform `(cos + 1) / 2` so it can be blended with the hard
//! score. A zero-magnitude vector on either side has no direction and scores
//! [`DEGENERATE_SCORE`].

use candle_core::{Device, Tensor};

use crate::error::{Error, Result};

/// Semantic score assigned when either vector has zero magnitude.
pub const DEGENERATE_SCORE: f32 = 0.0;

/// Map a cosine similarity onto `[0, 1]`.
pub fn cosine_to_unit(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Euclidean length, accumulated in f64 so very large or very small f32
/// components neither overflow nor flush to zero.
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt()
}

/// Scale `v` to unit length. Returns `None` for a zero-magnitude or
/// non-finite vector.
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|&x| (f64::from(x) / norm) as f32).collect())
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Semantic score for a single pair of vectors.
pub fn score(query: &[f32], listing: &[f32]) -> Result<f32> {
    check_dimension(listing.len(), query.len())?;

    let (Some(q), Some(l)) = (normalize(query), normalize(listing)) else {
        return Ok(DEGENERATE_SCORE);
    };
    let cosine: f32 = q.iter().zip(&l).map(|(a, b)| a * b).sum();
    Ok(cosine_to_unit(cosine))
}

/// N×D matrix of unit-length listing embeddings, one row per listing.
///
/// Degenerate rows are stored as zeros and remembered so their score can be
/// replaced by [`DEGENERATE_SCORE`] instead of the `0.5` an all-zero row
/// would otherwise map to.
#[derive(Debug, Clone)]
pub struct UnitMatrix {
    rows: Tensor,
    degenerate: Vec<bool>,
    dimension: usize,
}

impl UnitMatrix {
    /// Normalize and pack `vectors`, which must all have length `dimension`.
    pub fn from_vectors(vectors: &[Vec<f32>], dimension: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(vectors.len() * dimension);
        let mut degenerate = Vec::with_capacity(vectors.len());

        for v in vectors {
            check_dimension(dimension, v.len())?;
            match normalize(v) {
                Some(unit) => {
                    data.extend_from_slice(&unit);
                    degenerate.push(false);
                }
                None => {
                    data.extend(std::iter::repeat_n(0.0, dimension));
                    degenerate.push(true);
                }
            }
        }

        let rows = Tensor::from_vec(data, (vectors.len(), dimension), &Device::Cpu)?;
        Ok(Self {
            rows,
            degenerate,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.degenerate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.degenerate.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn degenerate_count(&self) -> usize {
        self.degenerate.iter().filter(|d| **d).count()
    }

    /// Score every row against `query` with one matrix–vector product.
    pub fn score_batch(&self, query: &[f32]) -> Result<Vec<f32>> {
        check_dimension(self.dimension, query.len())?;

        if self.is_empty() {
            return Ok(Vec::new());
        }
        let Some(q) = normalize(query) else {
            return Ok(vec![DEGENERATE_SCORE; self.len()]);
        };

        let q = Tensor::from_vec(q, (self.dimension, 1), &Device::Cpu)?;
        let cosines = self.rows.matmul(&q)?.squeeze(1)?.to_vec1::<f32>()?;

        Ok(cosines
            .into_iter()
            .zip(&self.degenerate)
            .map(|(cos, &degenerate)| {
                if degenerate {
                    DEGENERATE_SCORE
                } else {
                    cosine_to_unit(cos)
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let s = score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_score_zero() {
        let s = score(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!(s.abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_half() {
        let s = score(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((s - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_falls_back() {
        assert_eq!(score(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), DEGENERATE_SCORE);
        assert_eq!(score(&[1.0, 0.0], &[0.0, 0.0]).unwrap(), DEGENERATE_SCORE);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let err = score(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn batch_matches_pairwise() {
        let rows = vec![vec![1.0, 0.0, 0.0], vec![0.0, 2.0, 0.0], vec![1.0, 1.0, 1.0]];
        let query = [0.5, 0.5, 0.0];
        let matrix = UnitMatrix::from_vectors(&rows, 3).unwrap();
        let batch = matrix.score_batch(&query).unwrap();

        assert_eq!(batch.len(), 3);
        for (row, got) in rows.iter().zip(&batch) {
            let expected = score(&query, row).unwrap();
            assert!((expected - got).abs() < 1e-5);
        }
    }

    #[test]
    fn batch_handles_degenerate_rows_and_query() {
        let rows = vec![vec![0.0, 0.0], vec![1.0, 0.0]];
        let matrix = UnitMatrix::from_vectors(&rows, 2).unwrap();
        assert_eq!(matrix.degenerate_count(), 1);

        let scores = matrix.score_batch(&[1.0, 0.0]).unwrap();
        assert_eq!(scores[0], DEGENERATE_SCORE);
        assert!((scores[1] - 1.0).abs() < 1e-6);

        let scores = matrix.score_batch(&[0.0, 0.0]).unwrap();
        assert_eq!(scores, vec![DEGENERATE_SCORE, DEGENERATE_SCORE]);
    }

    #[test]
    fn empty_matrix_scores_nothing() {
        let matrix = UnitMatrix::from_vectors(&[], 4).unwrap();
        assert!(matrix.is_empty());
        assert!(matrix.score_batch(&[1.0, 0.0, 0.0, 0.0]).unwrap().is_empty());
    }

    #[test]
    fn batch_rejects_wrong_query_dimension() {
        let matrix = UnitMatrix::from_vectors(&[vec![1.0, 0.0]], 2).unwrap();
        assert!(matrix.score_batch(&[1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn from_vectors_rejects_ragged_rows() {
        let rows = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(UnitMatrix::from_vectors(&rows, 2).is_err());
    }

    fn vector() -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-10.0f32..10.0, 8)
            .prop_filter("non-degenerate", |v| l2_norm(v) > 1e-3)
    }

    fn scale(v: &[f32], factor: f32) -> Vec<f32> {
        v.iter().map(|x| x * factor).collect()
    }

    #[test]
    fn extreme_magnitudes_are_not_degenerate() {
        let q = [1.0, 2.0, 0.5];
        let l = [2.0, 1.0, 3.0];
        let base = score(&q, &l).unwrap();
        assert!(base > DEGENERATE_SCORE);

        for factor in [1e20, 1e30, 1e-25, 1e-30] {
            let rescaled = score(&q, &scale(&l, factor)).unwrap();
            assert!((base - rescaled).abs() < 1e-5, "factor {factor}");
            let rescaled = score(&scale(&q, factor), &l).unwrap();
            assert!((base - rescaled).abs() < 1e-5, "factor {factor}");
        }

        let matrix = UnitMatrix::from_vectors(&[scale(&l, 1e30), scale(&l, 1e-30)], 3).unwrap();
        assert_eq!(matrix.degenerate_count(), 0);
    }

    fn scale_factor() -> impl Strategy<Value = f32> {
        (-30i32..=30, 1.0f32..10.0).prop_map(|(exp, mantissa)| mantissa * 10f32.powi(exp))
    }

    proptest! {
        #[test]
        fn score_is_scale_invariant(
            q in vector(),
            l in vector(),
            factor in scale_factor(),
        ) {
            let scaled = scale(&l, factor);
            let base = score(&q, &l).unwrap();
            let rescaled = score(&q, &scaled).unwrap();
            prop_assert!((base - rescaled).abs() < 1e-4);

            let matrix = UnitMatrix::from_vectors(&[l.clone(), scaled], 8).unwrap();
            let batch = matrix.score_batch(&q).unwrap();
            prop_assert!((batch[0] - batch[1]).abs() < 1e-4);
        }

        #[test]
        fn score_is_invariant_to_query_scale(
            q in vector(),
            l in vector(),
            factor in scale_factor(),
        ) {
            let scaled_q = scale(&q, factor);
            let base = score(&q, &l).unwrap();
            prop_assert!((base - score(&scaled_q, &l).unwrap()).abs() < 1e-4);

            let matrix = UnitMatrix::from_vectors(&[l], 8).unwrap();
            let unscaled = matrix.score_batch(&q).unwrap();
            let rescaled = matrix.score_batch(&scaled_q).unwrap();
            prop_assert!((unscaled[0] - rescaled[0]).abs() < 1e-4);
        }

        #[test]
        fn identical_embeddings_score_identically(q in vector(), l in vector()) {
            let matrix = UnitMatrix::from_vectors(&[l.clone(), l], 8).unwrap();
            let batch = matrix.score_batch(&q).unwrap();
            prop_assert_eq!(batch[0], batch[1]);
        }

        #[test]
        fn score_is_within_unit_interval(q in vector(), l in vector()) {
            let s = score(&q, &l).unwrap();
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
