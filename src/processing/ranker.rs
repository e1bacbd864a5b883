//! Cosine similarity and top-N ranking of job vectors against the resume

use crate::error::{JobMatcherError, Result};
use crate::processing::embeddings::EmbeddingVector;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub job_id: String,
    pub score: f32,
    /// 1-based position in the ranked output
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub results: Vec<SimilarityResult>,
    /// Number of job vectors scored
    pub considered: usize,
    /// Number of job vectors dropped for scoring below `min_score`
    pub filtered_out: usize,
}

/// Cosine similarity of two equal-length slices.
///
/// Accumulates in `f64`, clamps into [-1, 1] and returns 0.0 when either
/// side has zero magnitude. The result is symmetric bit-for-bit.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(JobMatcherError::Processing(format!(
            "Embedding dimensions don't match: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !score.is_finite() {
        return Ok(0.0);
    }

    // `+ 0.0` turns -0.0 into 0.0 so equal scores compare equal when sorting
    Ok((score.clamp(-1.0, 1.0) as f32) + 0.0)
}

/// Similarity between two vectors from the same model.
pub fn similarity(left: &EmbeddingVector, right: &EmbeddingVector) -> Result<f32> {
    if !left.is_compatible_with(right) {
        return Err(JobMatcherError::IncompatibleVector {
            left_id: left.owner_id().to_string(),
            right_id: right.owner_id().to_string(),
            left_model: left.model_id().to_string(),
            right_model: right.model_id().to_string(),
            left_dimension: left.dimension(),
            right_dimension: right.dimension(),
        });
    }
    cosine(left.values(), right.values())
}

/// Score every job against the resume and keep the best `top_n`.
///
/// Jobs scoring strictly below `min_score` are dropped. Results are ordered
/// by descending score, ties by ascending job id. Any job vector from a
/// different model or dimension fails the whole call.
pub fn rank(
    resume: &EmbeddingVector,
    jobs: &[EmbeddingVector],
    top_n: usize,
    min_score: f32,
) -> Result<Ranking> {
    if top_n == 0 {
        return Err(JobMatcherError::Configuration("top_n must be positive".to_string()));
    }
    if !min_score.is_finite() {
        return Err(JobMatcherError::Configuration(format!(
            "min_score must be finite, got {}",
            min_score
        )));
    }

    let mut scored: Vec<(&str, f32)> = Vec::with_capacity(jobs.len());
    let mut filtered_out = 0;

    for job in jobs {
        let score = similarity(resume, job)?;
        if score < min_score {
            filtered_out += 1;
            continue;
        }
        scored.push((job.owner_id(), score));
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let results: Vec<SimilarityResult> = scored
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(idx, (job_id, score))| SimilarityResult {
            job_id: job_id.to_string(),
            score,
            rank: idx + 1,
        })
        .collect();

    debug!(
        "Ranked {} jobs: {} below min_score {}, returning {}",
        jobs.len(),
        filtered_out,
        min_score,
        results.len()
    );

    Ok(Ranking {
        results,
        considered: jobs.len(),
        filtered_out,
    })
}
