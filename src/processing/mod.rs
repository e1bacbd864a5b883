//! Embedding, caching and ranking

pub mod embeddings;
pub mod engine;
pub mod fingerprint;
pub mod hashing_provider;
pub mod ranker;
pub mod vector_store;

pub use embeddings::{EmbeddingProvider, EmbeddingVector, Model2VecProvider, SharedProvider};
pub use engine::{EngineOptions, MatchEngine, MatchReport};
pub use hashing_provider::HashingProvider;
pub use ranker::{cosine, rank, similarity, Ranking, SimilarityResult};
pub use vector_store::{BatchOptions, EmbedOutcome, RecordFailure, VectorCache, VectorStore};
