//! Job postings as produced by the scraping stage, and their conversion to records

use crate::error::{JobMatcherError, Result};
use crate::input::record::TextRecord;
use crate::processing::fingerprint;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

const PLACEHOLDERS: [&str; 4] = ["No Company", "No Location", "No Description", "No Title"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty() && !PLACEHOLDERS.contains(value))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

impl JobPosting {
    /// Stable id: the explicit one, otherwise a hash over url and headline fields.
    pub fn record_id(&self) -> String {
        if let Some(id) = present(&self.id) {
            return id.to_string();
        }
        fingerprint::short_id(
            "job",
            &[
                self.url.as_deref().unwrap_or_default(),
                self.title.as_deref().unwrap_or_default(),
                self.company.as_deref().unwrap_or_default(),
                self.location.as_deref().unwrap_or_default(),
            ],
        )
    }

    /// Title, company, location and description joined into one block.
    pub fn compose_text(&self, max_description_chars: usize) -> String {
        let mut parts = Vec::new();

        if let Some(title) = present(&self.title) {
            parts.push(format!("Job Title: {}", title));
        }
        if let Some(company) = present(&self.company) {
            parts.push(format!("Company: {}", company));
        }
        if let Some(location) = present(&self.location) {
            parts.push(format!("Location: {}", location));
        }
        if let Some(description) = present(&self.description) {
            parts.push(format!("Description: {}", truncate_chars(description, max_description_chars)));
        }

        parts.join(" | ")
    }

    pub fn to_record(&self, max_description_chars: usize) -> TextRecord {
        let mut record = TextRecord::job(self.record_id(), self.compose_text(max_description_chars));
        for (key, value) in [
            ("title", &self.title),
            ("company", &self.company),
            ("location", &self.location),
            ("url", &self.url),
            ("source", &self.source),
        ] {
            if let Some(value) = present(value) {
                record = record.with_metadata(key, value);
            }
        }
        record
    }
}

/// Read a JSON array of postings.
pub async fn load_job_postings(path: &Path) -> Result<Vec<JobPosting>> {
    if !path.exists() {
        return Err(JobMatcherError::invalid_input(
            path.display().to_string(),
            "job postings file does not exist",
        ));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let postings: Vec<JobPosting> = serde_json::from_str(&content)?;
    info!("Loaded {} job postings from {}", postings.len(), path.display());
    Ok(postings)
}

/// Convert postings to records in file order.
///
/// Repeated ids are kept. The first occurrence is embedded and every later
/// one is reported as a failure for that id when the records are matched.
pub fn postings_to_records(postings: &[JobPosting], max_description_chars: usize) -> Vec<TextRecord> {
    postings
        .iter()
        .map(|posting| posting.to_record(max_description_chars))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn posting() -> JobPosting {
        JobPosting {
            title: Some("Backend Engineer".to_string()),
            company: Some("Acme".to_string()),
            location: Some("No Location".to_string()),
            description: Some("Build services in Rust".to_string()),
            url: Some("https://example.com/jobs/1".to_string()),
            source: Some("indeed".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_skips_placeholders() {
        let text = posting().compose_text(1000);
        assert_eq!(
            text,
            "Job Title: Backend Engineer | Company: Acme | Description: Build services in Rust"
        );
    }

    #[test]
    fn test_long_description_is_cut() {
        let mut p = posting();
        p.description = Some("x".repeat(20));
        let text = p.compose_text(5);
        assert!(text.ends_with("Description: xxxxx..."));
    }

    #[test]
    fn test_derived_id_is_stable() {
        let p = posting();
        assert_eq!(p.record_id(), posting().record_id());
        assert!(p.record_id().starts_with("job-"));

        let mut explicit = posting();
        explicit.id = Some("indeed-42".to_string());
        assert_eq!(explicit.record_id(), "indeed-42");
    }

    #[test]
    fn test_record_metadata() {
        let record = posting().to_record(1000);
        assert_eq!(record.metadata_value("company"), Some("Acme"));
        assert_eq!(record.metadata_value("location"), None);
        assert_eq!(record.metadata_value("source"), Some("indeed"));
    }

    #[test]
    fn test_duplicate_ids_do_not_abort_conversion() {
        let mut other = posting();
        other.title = Some("Data Analyst".to_string());
        let postings = vec![posting(), other.clone(), posting()];

        let records = postings_to_records(&postings, 1000);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, records[2].id);
        assert_ne!(records[0].id, records[1].id);
    }

    #[tokio::test]
    async fn test_load_job_postings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"[{"title": "Data Analyst", "company": "Beta"}, {"id": "j2", "description": "SQL"}]"#,
        )
        .unwrap();

        let postings = load_job_postings(&path).await.unwrap();
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[1].record_id(), "j2");
    }
}
