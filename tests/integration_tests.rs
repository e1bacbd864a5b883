//! Integration tests for the job matcher

use job_matcher::input::postings::{load_job_postings, postings_to_records};
use job_matcher::input::{ResumeLoader, TextRecord};
use job_matcher::output::{ConsoleFormatter, JsonFormatter, MatchDocument, OutputFormatter};
use job_matcher::processing::embeddings::SharedProvider;
use job_matcher::processing::engine::{EngineOptions, MatchEngine, MatchReport};
use job_matcher::processing::hashing_provider::HashingProvider;
use job_matcher::processing::vector_store::{VectorCache, VectorStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn fixture_records() -> (TextRecord, Vec<TextRecord>) {
    let postings = load_job_postings(Path::new("tests/fixtures/jobs.json")).await.unwrap();
    let jobs = postings_to_records(&postings, 1000);
    let resume = ResumeLoader::new(2000)
        .unwrap()
        .load(Path::new("tests/fixtures/sample_resume.txt"))
        .await
        .unwrap();
    (resume, jobs)
}

async fn run_scoped(
    cache_path: &Path,
    provider: SharedProvider,
    resume: &TextRecord,
    jobs: &[TextRecord],
) -> job_matcher::Result<MatchReport> {
    VectorStore::scoped(cache_path, |store| async move {
        let engine = MatchEngine::new(provider, store, EngineOptions::default())?;
        engine.run(resume, jobs).await
    })
    .await
}

fn position(report: &MatchReport, job_id: &str) -> Option<usize> {
    report.results.iter().position(|r| r.job_id == job_id)
}

#[tokio::test]
async fn test_fixture_jobs_ranked_against_resume() {
    let (resume, jobs) = fixture_records().await;
    assert_eq!(resume.id, "resume-sample_resume");
    assert_eq!(jobs.len(), 5);

    let provider: SharedProvider = Arc::new(HashingProvider::new(512).unwrap());
    let engine = MatchEngine::new(provider, Arc::new(VectorStore::default()), EngineOptions::default()).unwrap();
    let report = engine.run(&resume, &jobs).await.unwrap();

    assert_eq!(report.jobs_total, 5);
    assert_eq!(report.jobs_considered, 4);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, "job-placeholder");
    assert_eq!(report.failures[0].kind, "invalid_input");

    let rust = position(&report, "job-rust").unwrap();
    let warehouse = position(&report, "job-warehouse");
    assert!(warehouse.map_or(true, |w| rust < w));
    assert!(report.results.windows(2).all(|w| w[0].score >= w[1].score));
    for (idx, result) in report.results.iter().enumerate() {
        assert_eq!(result.rank, idx + 1);
    }
}

#[tokio::test]
async fn test_cache_persists_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("cache").join("vectors.json");
    let (resume, jobs) = fixture_records().await;

    let first_provider = Arc::new(HashingProvider::new(256).unwrap());
    let first = run_scoped(&cache_path, first_provider.clone(), &resume, &jobs).await.unwrap();
    assert!(cache_path.exists());
    assert_eq!(first.cache_misses, 5);
    assert!(first_provider.encode_calls() > 0);

    let cache = VectorCache::load(&cache_path).unwrap();
    assert_eq!(cache.len(), 5);
    assert_eq!(cache.models().get("hashing-256"), Some(&5));

    // a fresh process with the same model reads everything from disk
    let second_provider = Arc::new(HashingProvider::new(256).unwrap());
    let second = run_scoped(&cache_path, second_provider.clone(), &resume, &jobs).await.unwrap();
    assert_eq!(second_provider.encode_calls(), 0);
    assert_eq!(second.cache_hits, 5);
    assert_eq!(first.results, second.results);
}

#[tokio::test]
async fn test_changed_text_and_model_are_recomputed() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("vectors.json");
    let (resume, jobs) = fixture_records().await;

    let provider = Arc::new(HashingProvider::new(128).unwrap());
    run_scoped(&cache_path, provider, &resume, &jobs).await.unwrap();

    let mut edited = jobs.clone();
    edited[0] = TextRecord::job("job-rust", "Senior Rust Engineer, now also writing Zig");
    let provider = Arc::new(HashingProvider::new(128).unwrap());
    let report = run_scoped(&cache_path, provider.clone(), &resume, &edited).await.unwrap();
    assert_eq!(provider.records_encoded(), 1);
    assert_eq!(report.cache_misses, 1);

    let other_model = Arc::new(HashingProvider::new(128).unwrap().with_model_id("other-model"));
    let report = run_scoped(&cache_path, other_model.clone(), &resume, &jobs).await.unwrap();
    assert_eq!(other_model.records_encoded(), 5);
    assert_eq!(report.model_id, "other-model");

    let cache = VectorCache::load(&cache_path).unwrap();
    assert_eq!(cache.models().get("hashing-128"), Some(&5));
    assert_eq!(cache.models().get("other-model"), Some(&5));
}

#[tokio::test]
async fn test_corrupt_cache_file_starts_empty() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("vectors.json");
    std::fs::write(&cache_path, "{ this is not json").unwrap();

    let (resume, jobs) = fixture_records().await;
    let provider = Arc::new(HashingProvider::new(64).unwrap());
    let report = run_scoped(&cache_path, provider, &resume, &jobs).await.unwrap();
    assert_eq!(report.cache_hits, 0);

    // the rewritten file is valid again
    assert_eq!(VectorCache::load(&cache_path).unwrap().len(), 5);
}

#[tokio::test]
async fn test_failed_run_still_persists_cache() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("vectors.json");
    let (_, jobs) = fixture_records().await;

    let provider: SharedProvider = Arc::new(HashingProvider::new(64).unwrap());
    let result: job_matcher::Result<()> = VectorStore::scoped(&cache_path, |store| async move {
        let engine = MatchEngine::new(provider, store, EngineOptions::default())?;
        let resume = TextRecord::resume("resume-ok", "rust engineer");
        engine.run(&resume, &jobs).await?;
        engine.run(&TextRecord::resume("resume-blank", "   "), &jobs).await?;
        Ok(())
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.record_id(), Some("resume-blank"));
    assert_eq!(VectorCache::load(&cache_path).unwrap().len(), 5);
}

#[tokio::test]
async fn test_concurrent_runs_encode_each_key_once() {
    let (resume, jobs) = fixture_records().await;
    let counter = Arc::new(HashingProvider::new(64).unwrap().with_delay(Duration::from_millis(50)));
    let provider: SharedProvider = counter.clone();
    let store = Arc::new(VectorStore::default());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = MatchEngine::new(Arc::clone(&provider), Arc::clone(&store), EngineOptions::default()).unwrap();
        let resume = resume.clone();
        let jobs = jobs.clone();
        handles.push(tokio::spawn(async move { engine.run(&resume, &jobs).await }));
    }

    let mut reports = Vec::new();
    for handle in handles {
        reports.push(handle.await.unwrap().unwrap());
    }

    // resume plus the four valid jobs
    assert_eq!(counter.records_encoded(), 5);
    assert_eq!(store.len(), 5);
    assert!(reports.windows(2).all(|w| w[0].results == w[1].results));
}

#[tokio::test]
async fn test_markdown_resume_matches_like_text_resume() {
    let loader = ResumeLoader::new(2000).unwrap();
    let markdown = loader.load(Path::new("tests/fixtures/sample_resume.md")).await.unwrap();
    assert!(!markdown.text.contains("**"));
    assert!(!markdown.text.contains('#'));
    assert!(markdown.text.contains("Rust"));

    let (_, jobs) = fixture_records().await;
    let provider: SharedProvider = Arc::new(HashingProvider::new(512).unwrap());
    let engine = MatchEngine::new(provider, Arc::new(VectorStore::default()), EngineOptions::default()).unwrap();
    let report = engine.run(&markdown, &jobs).await.unwrap();

    let rust = position(&report, "job-rust").unwrap();
    assert!(position(&report, "job-warehouse").map_or(true, |w| rust < w));
}

#[tokio::test]
async fn test_report_rendering_end_to_end() {
    let (resume, jobs) = fixture_records().await;
    let provider: SharedProvider = Arc::new(HashingProvider::new(256).unwrap());
    let options = EngineOptions {
        top_n: 3,
        min_score: -1.0,
        ..EngineOptions::default()
    };
    let engine = MatchEngine::new(provider, Arc::new(VectorStore::default()), options).unwrap();
    let report = engine.run(&resume, &jobs).await.unwrap();
    assert_eq!(report.results.len(), 3);

    let document = MatchDocument::build(&report, &resume, &jobs);
    let console = ConsoleFormatter::new(false, true).format_report(&document).unwrap();
    assert!(console.contains("job-placeholder [invalid_input]"));
    assert!(console.contains("Resume: resume-sample_resume"));

    let json = JsonFormatter::new(false).format_report(&document).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["matches"].as_array().unwrap().len(), 3);
    assert_eq!(value["run"]["jobs_total"], 5);
}
