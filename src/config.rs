//! Configuration management for the job matcher

use crate::error::{JobMatcherError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub ranking: RankingConfig,
    pub cache: CacheConfig,
    pub input: InputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// HuggingFace repo id or local directory of a Model2Vec model
    pub model: String,
    pub batch_size: usize,
    pub concurrency_limit: usize,
    pub max_tokens: usize,
    /// Overrides the model's own `normalize` flag when set
    pub normalize: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub top_n: usize,
    pub min_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// Drop cached vectors for ids absent from the current run
    #[serde(default)]
    pub prune: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub max_description_chars: usize,
    pub max_resume_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        let cache_path = dirs::cache_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("job-matcher")
            .join("vectors.json");

        Self {
            embedding: EmbeddingConfig {
                model: "minishlab/potion-base-8M".to_string(),
                batch_size: 32,
                concurrency_limit: 4,
                max_tokens: 512,
                normalize: None,
            },
            ranking: RankingConfig {
                top_n: 10,
                min_score: 0.0,
            },
            cache: CacheConfig {
                enabled: true,
                path: cache_path,
                prune: false,
            },
            input: InputConfig {
                max_description_chars: 1000,
                max_resume_chars: 2000,
            },
        }
    }
}

impl Config {
    /// Load the user config, writing defaults on first use.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| JobMatcherError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| JobMatcherError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("job-matcher")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.model.trim().is_empty() {
            return Err(JobMatcherError::Configuration("embedding.model cannot be empty".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(JobMatcherError::Configuration("embedding.batch_size must be positive".to_string()));
        }
        if self.embedding.concurrency_limit == 0 {
            return Err(JobMatcherError::Configuration(
                "embedding.concurrency_limit must be positive".to_string(),
            ));
        }
        if self.embedding.max_tokens == 0 {
            return Err(JobMatcherError::Configuration("embedding.max_tokens must be positive".to_string()));
        }
        validate_ranking(self.ranking.top_n, self.ranking.min_score)
    }
}

/// Shared check for ranking parameters, used by both the config file and the CLI overrides.
pub fn validate_ranking(top_n: usize, min_score: f32) -> Result<()> {
    if top_n == 0 {
        return Err(JobMatcherError::Configuration("top_n must be positive".to_string()));
    }
    if !min_score.is_finite() || !(-1.0..=1.0).contains(&min_score) {
        return Err(JobMatcherError::Configuration(format!(
            "min_score must be a finite value in [-1, 1], got {}",
            min_score
        )));
    }
    Ok(())
}
