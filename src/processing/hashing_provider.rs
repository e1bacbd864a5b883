//! Deterministic feature-hashing provider.
//!
//! Stands in for a real model in tests and dry runs: every lower-cased
//! alphanumeric token is hashed into one of `dimension` buckets with a sign
//! bit, and the bucket counts are L2-normalised. Texts that share words get
//! similar vectors, and the same text always gets the same vector.

use crate::error::{JobMatcherError, Result};
use crate::input::record::TextRecord;
use crate::processing::embeddings::{validate_records, EmbeddingProvider, EmbeddingVector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct HashingProvider {
    model_id: String,
    dimension: usize,
    delay: Option<Duration>,
    encode_calls: AtomicUsize,
    records_encoded: AtomicUsize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(JobMatcherError::ModelLoading(
                "hashing provider needs a positive dimension".to_string(),
            ));
        }
        Ok(Self {
            model_id: format!("hashing-{}", dimension),
            dimension,
            delay: None,
            encode_calls: AtomicUsize::new(0),
            records_encoded: AtomicUsize::new(0),
        })
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Sleep this long inside every `encode` call, to simulate a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    pub fn records_encoded(&self) -> usize {
        self.records_encoded.load(Ordering::SeqCst)
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        values
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, records: &[TextRecord]) -> Result<Vec<EmbeddingVector>> {
        validate_records(records)?;
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.records_encoded.fetch_add(records.len(), Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        records
            .iter()
            .map(|record| EmbeddingVector::new(&record.id, &self.model_id, self.embed_text(&record.text)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::ranker::cosine;

    #[test]
    fn test_same_text_same_vector() {
        let provider = HashingProvider::new(64).unwrap();
        let first = provider.encode(&[TextRecord::job("a", "Rust backend engineer")]).unwrap();
        let second = provider.encode(&[TextRecord::job("a", "Rust backend engineer")]).unwrap();
        assert_eq!(first[0].values(), second[0].values());
    }

    #[test]
    fn test_shared_words_raise_similarity() {
        let provider = HashingProvider::new(256).unwrap();
        let vectors = provider
            .encode(&[
                TextRecord::resume("me", "python data analysis sql"),
                TextRecord::job("close", "python sql data engineer"),
                TextRecord::job("far", "forklift warehouse night shift"),
            ])
            .unwrap();

        let close = cosine(vectors[0].values(), vectors[1].values()).unwrap();
        let far = cosine(vectors[0].values(), vectors[2].values()).unwrap();
        assert!(close > far);
    }

    #[test]
    fn test_empty_text_fails_whole_call() {
        let provider = HashingProvider::new(8).unwrap();
        let result = provider.encode(&[TextRecord::job("a", "ok"), TextRecord::job("b", " ")]);
        assert_eq!(result.unwrap_err().record_id(), Some("b"));
        assert_eq!(provider.encode_calls(), 0);
    }

    #[test]
    fn test_punctuation_only_text_is_zero_vector() {
        let provider = HashingProvider::new(8).unwrap();
        let vectors = provider.encode(&[TextRecord::job("a", "--- !!!")]).unwrap();
        assert!(vectors[0].values().iter().all(|v| *v == 0.0));
    }
}
