//! Job matcher library: embeds job postings and a resume, caches the
//! vectors, and ranks postings by cosine similarity to the resume.

pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod processing;

pub use config::Config;
pub use error::{JobMatcherError, Result};
pub use input::{RecordKind, TextRecord};
pub use processing::{
    EmbeddingProvider, EmbeddingVector, EngineOptions, MatchEngine, MatchReport, SimilarityResult, VectorStore,
};
