//! Cosine similarity and top-k ranking over embedded items.

use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimilarityError {
    #[error("vector dimension mismatch: query has {expected}, candidate has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Anything carrying an embedding vector.
pub trait Embedded {
    fn vector(&self) -> &[f32];
}

impl Embedded for Vec<f32> {
    fn vector(&self) -> &[f32] {
        self
    }
}

/// A candidate paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub score: f64,
}

/// Cosine similarity in `[-1, 1]`, accumulated in f64.
///
/// A zero-norm vector on either side scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Scores every candidate and keeps the `top_k` best, highest first.
///
/// Ties keep input order. `top_k == 0` returns nothing without scoring.
pub fn rank<T: Embedded>(
    query: &[f32],
    candidates: Vec<T>,
    top_k: usize,
) -> Result<Vec<Ranked<T>>, SimilarityError> {
    if top_k == 0 {
        return Ok(Vec::new());
    }

    let mut scored = Vec::with_capacity(candidates.len());
    for item in candidates {
        let score = cosine_similarity(query, item.vector())?;
        scored.push(Ranked { item, score });
    }

    // sort_by is stable, so equal scores stay in input order
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}
