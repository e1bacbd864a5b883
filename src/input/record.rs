//! Text records handed to the engine by the normalizer

use crate::error::{JobMatcherError, Result};
use crate::processing::fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Job,
    Resume,
}

/// A cleaned block of text with a stable identifier.
///
/// Records are immutable once built; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    pub id: String,
    pub kind: RecordKind,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Caller-supplied content key (hash or version marker). When absent the
    /// fingerprint is derived from `text`.
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl TextRecord {
    pub fn new(id: impl Into<String>, kind: RecordKind, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            text: text.into(),
            metadata: BTreeMap::new(),
            fingerprint: None,
        }
    }

    pub fn job(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, RecordKind::Job, text)
    }

    pub fn resume(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, RecordKind::Resume, text)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Key used by the vector cache to detect changed text across runs.
    pub fn content_fingerprint(&self) -> String {
        match &self.fingerprint {
            Some(fp) => fp.clone(),
            None => fingerprint::of_text(&self.text),
        }
    }

    /// Reject records the embedding provider must never see.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(JobMatcherError::invalid_input(&self.id, "record id is empty"));
        }
        if self.text.trim().is_empty() {
            return Err(JobMatcherError::invalid_input(&self.id, "text is empty after trimming"));
        }
        if let Some(fp) = &self.fingerprint {
            if fp.trim().is_empty() {
                return Err(JobMatcherError::invalid_input(&self.id, "fingerprint is empty"));
            }
        }
        Ok(())
    }
}
