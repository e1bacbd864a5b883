//! Embedding provider contract and the Model2Vec implementation

use crate::config::EmbeddingConfig;
use crate::error::{JobMatcherError, Result};
use crate::input::record::TextRecord;
use log::{debug, info};
use model2vec_rs::model::StaticModel;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Fixed-length vector produced by one embedding model for one record.
///
/// `dimension` always equals `values.len()` and every value is finite;
/// [`EmbeddingVector::new`] is the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingVector {
    owner_id: String,
    model_id: String,
    dimension: usize,
    values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn new(owner_id: impl Into<String>, model_id: impl Into<String>, values: Vec<f32>) -> Result<Self> {
        let owner_id = owner_id.into();
        if values.is_empty() {
            return Err(JobMatcherError::Embedding(format!(
                "vector for '{}' has zero dimension",
                owner_id
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(JobMatcherError::Embedding(format!(
                "vector for '{}' has a non-finite value at position {}",
                owner_id, pos
            )));
        }

        Ok(Self {
            owner_id,
            model_id: model_id.into(),
            dimension: values.len(),
            values,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Two vectors are comparable only when model and dimension agree.
    pub fn is_compatible_with(&self, other: &EmbeddingVector) -> bool {
        self.model_id == other.model_id && self.dimension == other.dimension
    }
}

/// Turns text records into vectors.
///
/// Implementations own their model: it is loaded once at construction and
/// shared read-only by every call. `encode` must be order-preserving, return
/// exactly one vector per record, and give the same output for the same text
/// regardless of how records are grouped into calls.
///
/// `encode` is all-or-nothing: an invalid record fails the whole call with
/// [`JobMatcherError::InvalidInput`] naming that record.
pub trait EmbeddingProvider: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    fn encode(&self, records: &[TextRecord]) -> Result<Vec<EmbeddingVector>>;
}

pub type SharedProvider = Arc<dyn EmbeddingProvider>;

/// Check every record before any of them reaches a model.
pub fn validate_records(records: &[TextRecord]) -> Result<()> {
    records.iter().try_for_each(TextRecord::validate)
}

/// Check that a provider kept its side of the contract for `records`.
pub fn verify_output(provider: &dyn EmbeddingProvider, records: &[TextRecord], vectors: &[EmbeddingVector]) -> Result<()> {
    if vectors.len() != records.len() {
        return Err(JobMatcherError::Embedding(format!(
            "provider '{}' returned {} vectors for {} records",
            provider.model_id(),
            vectors.len(),
            records.len()
        )));
    }

    for (record, vector) in records.iter().zip(vectors) {
        if vector.owner_id() != record.id {
            return Err(JobMatcherError::Embedding(format!(
                "provider '{}' returned vector for '{}' in place of '{}'",
                provider.model_id(),
                vector.owner_id(),
                record.id
            )));
        }
        if vector.model_id() != provider.model_id() || vector.dimension() != provider.dimension() {
            return Err(JobMatcherError::IncompatibleVector {
                left_id: "provider".to_string(),
                right_id: record.id.clone(),
                left_model: provider.model_id().to_string(),
                right_model: vector.model_id().to_string(),
                left_dimension: provider.dimension(),
                right_dimension: vector.dimension(),
            });
        }
    }

    Ok(())
}

/// Run a provider on the blocking pool and verify what it returns.
pub async fn encode_blocking(provider: SharedProvider, records: Vec<TextRecord>) -> Result<Vec<EmbeddingVector>> {
    tokio::task::spawn_blocking(move || -> Result<Vec<EmbeddingVector>> {
        let vectors = provider.encode(&records)?;
        verify_output(provider.as_ref(), &records, &vectors)?;
        Ok(vectors)
    })
    .await
    .map_err(|e| JobMatcherError::Embedding(format!("encoding task failed: {}", e)))?
}

/// Model2Vec static embeddings.
pub struct Model2VecProvider {
    model: StaticModel,
    model_id: String,
    dimension: usize,
    batch_size: usize,
    max_tokens: usize,
}

impl Model2VecProvider {
    /// Load the model from a local directory or HuggingFace repo id.
    ///
    /// This is the only place a model load can fail; the error is fatal for the run.
    pub fn new(model: &str, batch_size: usize, max_tokens: usize, normalize: Option<bool>) -> Result<Self> {
        if batch_size == 0 || max_tokens == 0 {
            return Err(JobMatcherError::Configuration(
                "batch_size and max_tokens must be positive".to_string(),
            ));
        }

        let start_time = Instant::now();
        info!("Loading Model2Vec embedding model: {}", model);

        let static_model = StaticModel::from_pretrained(model, None, normalize, None)
            .map_err(|e| JobMatcherError::ModelLoading(format!("Failed to load model '{}': {}", model, e)))?;

        // unknown tokens pool to a zero vector of the model's width
        let dimension = static_model.encode_single("dimension check").len();
        if dimension == 0 {
            return Err(JobMatcherError::ModelLoading(format!(
                "Model '{}' produced zero-dimension embeddings",
                model
            )));
        }

        info!(
            "Model loaded in {:.2?} (dimension {})",
            start_time.elapsed(),
            dimension
        );

        Ok(Self {
            model: static_model,
            model_id: Self::compose_model_id(model, max_tokens, normalize),
            dimension,
            batch_size,
            max_tokens,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(&config.model, config.batch_size, config.max_tokens, config.normalize)
    }

    /// Settings that change output values are part of the model identity.
    pub fn compose_model_id(model: &str, max_tokens: usize, normalize: Option<bool>) -> String {
        let normalize = match normalize {
            Some(true) => "on",
            Some(false) => "off",
            None => "model",
        };
        format!("model2vec:{}:tokens={}:normalize={}", model, max_tokens, normalize)
    }
}

impl EmbeddingProvider for Model2VecProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, records: &[TextRecord]) -> Result<Vec<EmbeddingVector>> {
        validate_records(records)?;

        let mut vectors = Vec::with_capacity(records.len());
        for batch in records.chunks(self.batch_size) {
            let start_time = Instant::now();
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let embeddings = self.model.encode_with_args(&texts, Some(self.max_tokens), texts.len());

            if embeddings.len() != batch.len() {
                return Err(JobMatcherError::Embedding(format!(
                    "model returned {} embeddings for a batch of {}",
                    embeddings.len(),
                    batch.len()
                )));
            }

            for (record, values) in batch.iter().zip(embeddings) {
                vectors.push(EmbeddingVector::new(&record.id, &self.model_id, values)?);
            }

            debug!(
                "Encoded batch of {} records in {:.2?}",
                batch.len(),
                start_time.elapsed()
            );
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MisbehavingProvider;

    impl EmbeddingProvider for MisbehavingProvider {
        fn model_id(&self) -> &str {
            "bad"
        }

        fn dimension(&self) -> usize {
            2
        }

        fn encode(&self, records: &[TextRecord]) -> Result<Vec<EmbeddingVector>> {
            records
                .iter()
                .map(|r| EmbeddingVector::new(&r.id, "bad", vec![1.0, 0.0, 0.0]))
                .collect()
        }
    }

    #[test]
    fn test_vector_rejects_empty_and_non_finite() {
        assert!(EmbeddingVector::new("a", "m", vec![]).is_err());
        assert!(EmbeddingVector::new("a", "m", vec![1.0, f32::NAN]).is_err());

        let vector = EmbeddingVector::new("a", "m", vec![0.5, 0.5]).unwrap();
        assert_eq!(vector.dimension(), 2);
        assert_eq!(vector.owner_id(), "a");
    }

    #[test]
    fn test_compatibility_requires_model_and_dimension() {
        let a = EmbeddingVector::new("a", "m1", vec![1.0, 0.0]).unwrap();
        let b = EmbeddingVector::new("b", "m1", vec![0.0, 1.0]).unwrap();
        let c = EmbeddingVector::new("c", "m2", vec![0.0, 1.0]).unwrap();
        let d = EmbeddingVector::new("d", "m1", vec![0.0, 1.0, 0.0]).unwrap();
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
        assert!(!a.is_compatible_with(&d));
    }

    #[test]
    fn test_validate_records_names_first_bad_id() {
        let records = vec![
            TextRecord::job("ok", "fine"),
            TextRecord::job("blank", "  "),
            TextRecord::job("also-blank", ""),
        ];
        let err = validate_records(&records).unwrap_err();
        assert_eq!(err.record_id(), Some("blank"));
    }

    #[test]
    fn test_verify_output_catches_wrong_dimension() {
        let provider = MisbehavingProvider;
        let records = vec![TextRecord::job("j1", "text")];
        let vectors = provider.encode(&records).unwrap();
        let err = verify_output(&provider, &records, &vectors).unwrap_err();
        assert_eq!(err.kind(), "incompatible_vector");
        assert_eq!(err.record_id(), Some("j1"));
        match err {
            JobMatcherError::IncompatibleVector { left_id, left_model, .. } => {
                assert_eq!(left_id, "provider");
                assert_eq!(left_model, provider.model_id());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_model_id_includes_output_settings() {
        let a = Model2VecProvider::compose_model_id("minishlab/potion-base-8M", 512, None);
        let b = Model2VecProvider::compose_model_id("minishlab/potion-base-8M", 256, None);
        let c = Model2VecProvider::compose_model_id("minishlab/potion-base-8M", 512, Some(false));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_zero_batch_size_rejected_before_load() {
        let result = Model2VecProvider::new("minishlab/potion-base-8M", 0, 512, None);
        assert!(matches!(result, Err(JobMatcherError::Configuration(_))));
    }
}
