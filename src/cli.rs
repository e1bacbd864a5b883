//! CLI interface for the job matcher

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "job-matcher")]
#[command(about = "Rank job postings against a resume by embedding similarity")]
#[command(long_about = "Embed job postings and a resume with a Model2Vec model, cache the vectors on disk, and rank jobs by cosine similarity")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank job postings against a resume
    Match {
        /// Path to a JSON array of job postings
        #[arg(short, long)]
        jobs: PathBuf,

        /// Path to resume file (PDF, TXT, MD)
        #[arg(short, long)]
        resume: PathBuf,

        /// Embedding model (HuggingFace repo id or local directory)
        #[arg(short, long)]
        model: Option<String>,

        /// Number of matches to return
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Drop jobs scoring below this cosine similarity
        #[arg(long, allow_hyphen_values = true)]
        min_score: Option<f32>,

        /// Records per encode call
        #[arg(long)]
        batch_size: Option<usize>,

        /// Maximum encode batches in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Vector cache file
        #[arg(long, conflicts_with = "no_cache")]
        cache: Option<PathBuf>,

        /// Run without reading or writing the vector cache
        #[arg(long)]
        no_cache: bool,

        /// Drop cached vectors for ids not in this run
        #[arg(long, conflicts_with = "no_cache")]
        prune_cache: bool,

        /// Output format: console, json, csv
        #[arg(short, long, default_value = "console")]
        output: String,

        /// Save output to file (a directory gets a generated file name; JSON also writes a .csv beside it)
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// Show job ids, urls and failure messages
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show or reset configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Inspect or clear the vector cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show entry counts per model
    Stats {
        /// Vector cache file
        #[arg(long)]
        cache: Option<PathBuf>,
    },

    /// Remove every cached vector
    Clear {
        /// Vector cache file
        #[arg(long)]
        cache: Option<PathBuf>,
    },
}

/// Validate file extension
pub fn validate_file_extension(path: &Path, allowed_extensions: &[&str]) -> Result<(), String> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => {
            if allowed_extensions.contains(&ext.to_lowercase().as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "Unsupported file extension: .{}. Allowed: {}",
                    ext,
                    allowed_extensions.join(", ")
                ))
            }
        }
        None => Err("File has no extension".to_string()),
    }
}
