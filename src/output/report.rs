//! Report document: ranked matches joined back to their postings, plus summary statistics

use crate::input::record::TextRecord;
use crate::processing::engine::MatchReport;
use crate::processing::vector_store::RecordFailure;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const UNKNOWN: &str = "Unknown";

/// One ranked job with the posting fields a reader cares about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedJob {
    pub rank: usize,
    pub job_id: String,
    pub score: f32,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub highest: f32,
    pub lowest: f32,
    pub average: f32,
}

/// Aggregates over the returned matches only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub scores: Option<ScoreSummary>,
    /// Most frequent first, ties by name
    pub by_company: Vec<(String, usize)>,
    /// Same ordering as `by_company`
    pub by_location: Vec<(String, usize)>,
    pub by_source: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInfo {
    pub resume_id: String,
    pub model_id: String,
    pub dimension: usize,
    pub top_n: usize,
    pub min_score: f32,
    pub jobs_total: usize,
    pub jobs_considered: usize,
    pub jobs_filtered: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_pruned: usize,
    pub processing_time_ms: u64,
    pub generated_at: DateTime<Utc>,
}

/// Everything a formatter renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDocument {
    pub run: RunInfo,
    pub matches: Vec<RankedJob>,
    pub summary: MatchSummary,
    pub failures: Vec<RecordFailure>,
}

impl MatchDocument {
    /// Join `report` results with the job records they came from.
    ///
    /// A result whose record is missing from `jobs` keeps its id and score
    /// with every posting field empty. For a repeated id the first record
    /// wins, matching the one that was embedded.
    pub fn build(report: &MatchReport, resume: &TextRecord, jobs: &[TextRecord]) -> Self {
        let mut by_id: HashMap<&str, &TextRecord> = HashMap::with_capacity(jobs.len());
        for job in jobs {
            by_id.entry(job.id.as_str()).or_insert(job);
        }

        let matches: Vec<RankedJob> = report
            .results
            .iter()
            .map(|result| {
                let record = by_id.get(result.job_id.as_str()).copied();
                let field = |key: &str| record.and_then(|r| r.metadata_value(key)).map(str::to_string);
                RankedJob {
                    rank: result.rank,
                    job_id: result.job_id.clone(),
                    score: result.score,
                    title: field("title"),
                    company: field("company"),
                    location: field("location"),
                    url: field("url"),
                    source: field("source"),
                }
            })
            .collect();

        let summary = summarize(&matches);

        Self {
            run: RunInfo {
                resume_id: resume.id.clone(),
                model_id: report.model_id.clone(),
                dimension: report.dimension,
                top_n: report.top_n,
                min_score: report.min_score,
                jobs_total: report.jobs_total,
                jobs_considered: report.jobs_considered,
                jobs_filtered: report.jobs_filtered,
                cache_hits: report.cache_hits,
                cache_misses: report.cache_misses,
                cache_pruned: report.cache_pruned,
                processing_time_ms: report.processing_time_ms,
                generated_at: report.generated_at,
            },
            matches,
            summary,
            failures: report.failures.clone(),
        }
    }
}

fn summarize(matches: &[RankedJob]) -> MatchSummary {
    let scores = if matches.is_empty() {
        None
    } else {
        let (mut highest, mut lowest, mut total) = (f32::MIN, f32::MAX, 0.0f64);
        for job in matches {
            highest = highest.max(job.score);
            lowest = lowest.min(job.score);
            total += f64::from(job.score);
        }
        Some(ScoreSummary {
            highest,
            lowest,
            average: (total / matches.len() as f64) as f32,
        })
    };

    let mut by_source = BTreeMap::new();
    for job in matches {
        *by_source
            .entry(job.source.clone().unwrap_or_else(|| UNKNOWN.to_string()))
            .or_default() += 1;
    }

    MatchSummary {
        scores,
        by_company: most_frequent(matches.iter().map(|job| job.company.as_deref())),
        by_location: most_frequent(matches.iter().map(|job| job.location.as_deref())),
        by_source,
    }
}

/// Count values, missing ones as "Unknown", most frequent first and ties by name.
fn most_frequent<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value.unwrap_or(UNKNOWN)).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}
