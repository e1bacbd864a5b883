//! End-to-end matching: embed the resume and jobs, then rank

use crate::config::{validate_ranking, Config};
use crate::error::{JobMatcherError, Result};
use crate::input::record::{RecordKind, TextRecord};
use crate::processing::embeddings::{EmbeddingProvider, SharedProvider};
use crate::processing::ranker::{rank, SimilarityResult};
use crate::processing::vector_store::{BatchOptions, RecordFailure, VectorSource, VectorStore};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Every knob the engine uses, passed in explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub batch_size: usize,
    pub concurrency_limit: usize,
    pub top_n: usize,
    pub min_score: f32,
    /// After a run, drop cached vectors whose id is neither the resume nor one of the jobs
    pub prune_cache: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency_limit: 4,
            top_n: 10,
            min_score: 0.0,
            prune_cache: false,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.embedding.batch_size,
            concurrency_limit: config.embedding.concurrency_limit,
            top_n: config.ranking.top_n,
            min_score: config.ranking.min_score,
            prune_cache: config.cache.prune,
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.concurrency_limit == 0 {
            return Err(JobMatcherError::Configuration(
                "batch_size and concurrency_limit must be positive".to_string(),
            ));
        }
        validate_ranking(self.top_n, self.min_score)
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            concurrency_limit: self.concurrency_limit,
        }
    }
}

/// Everything a reporter needs without re-deriving any ranking.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub results: Vec<SimilarityResult>,
    /// Job records supplied by the caller
    pub jobs_total: usize,
    /// Job records that were embedded and scored
    pub jobs_considered: usize,
    /// Scored jobs dropped for falling below `min_score`
    pub jobs_filtered: usize,
    pub failures: Vec<RecordFailure>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Cached vectors dropped because their id was not part of this run
    pub cache_pruned: usize,
    pub model_id: String,
    pub dimension: usize,
    pub top_n: usize,
    pub min_score: f32,
    pub processing_time_ms: u64,
    pub generated_at: DateTime<Utc>,
}

pub struct MatchEngine {
    provider: SharedProvider,
    store: Arc<VectorStore>,
    options: EngineOptions,
}

impl MatchEngine {
    pub fn new(provider: SharedProvider, store: Arc<VectorStore>, options: EngineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            provider,
            store,
            options,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Rank `jobs` against `resume`.
    ///
    /// Fails if the resume cannot be embedded. Job records that cannot be
    /// embedded are listed in [`MatchReport::failures`] and left out of the
    /// ranking.
    pub async fn run(&self, resume: &TextRecord, jobs: &[TextRecord]) -> Result<MatchReport> {
        let start_time = Instant::now();

        if resume.kind != RecordKind::Resume {
            return Err(JobMatcherError::invalid_input(&resume.id, "expected a resume record"));
        }

        let (resume_vector, resume_source) = self.store.get_or_compute_tracked(resume, &self.provider).await?;

        let mut failures = Vec::new();
        let mut eligible = Vec::with_capacity(jobs.len());
        for job in jobs {
            let rejection = if job.kind != RecordKind::Job {
                Some("expected a job record")
            } else if job.id == resume.id {
                Some("job id collides with the resume id")
            } else {
                None
            };

            match rejection {
                Some(reason) => {
                    let err = JobMatcherError::invalid_input(&job.id, reason);
                    failures.push(RecordFailure::new(&job.id, &err));
                }
                None => eligible.push(job.clone()),
            }
        }

        let outcome = self
            .store
            .embed_all(&eligible, &self.provider, self.options.batch_options())
            .await?;

        failures.extend(outcome.failures);
        for failure in &failures {
            warn!("Job '{}' skipped ({}): {}", failure.id, failure.kind, failure.message);
        }

        let ranking = rank(
            &resume_vector,
            &outcome.vectors,
            self.options.top_n,
            self.options.min_score,
        )?;

        let (mut cache_hits, mut cache_misses) = (outcome.hits, outcome.misses);
        if resume_source == VectorSource::Computed {
            cache_misses += 1;
        } else {
            cache_hits += 1;
        }

        let cache_pruned = if self.options.prune_cache {
            let keep: HashSet<String> = std::iter::once(resume.id.clone())
                .chain(jobs.iter().map(|job| job.id.clone()))
                .collect();
            let removed = self.store.retain_ids(&keep);
            if removed > 0 {
                info!("Pruned {} cached vectors for ids no longer present", removed);
            }
            removed
        } else {
            0
        };

        let report = MatchReport {
            results: ranking.results,
            jobs_total: jobs.len(),
            jobs_considered: ranking.considered,
            jobs_filtered: ranking.filtered_out,
            failures,
            cache_hits,
            cache_misses,
            cache_pruned,
            model_id: self.provider.model_id().to_string(),
            dimension: self.provider.dimension(),
            top_n: self.options.top_n,
            min_score: self.options.min_score,
            processing_time_ms: start_time.elapsed().as_millis() as u64,
            generated_at: Utc::now(),
        };

        info!(
            "Matched {} of {} jobs ({} below threshold, {} failed) in {} ms",
            report.results.len(),
            report.jobs_total,
            report.jobs_filtered,
            report.failures.len(),
            report.processing_time_ms
        );

        Ok(report)
    }
}
