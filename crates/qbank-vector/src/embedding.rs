//! Embedding generator trait and implementations.
//!
//! - `FallbackEmbedder` derives deterministic 384-dimensional vectors from
//!   character frequencies, word statistics, and an MD5 content hash. It is
//!   always available and is the reference embedding for the index.
//! - `ExternalModelEmbedder` loads a sentence-transformer ONNX model (e.g.
//!   all-MiniLM-L6-v2) via ort and tokenizes with the HuggingFace tokenizers
//!   crate. Any inference failure falls back to `FallbackEmbedder`, so
//!   embedding generation never fails for valid text.

use std::path::Path;
use std::sync::{Arc, Mutex};

use md5::{Digest, Md5};
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use qbank_core::error::QbankError;

/// Dimensionality of every embedding produced by this crate.
pub const EMBEDDING_DIM: usize = 384;

/// The 36 symbols whose frequencies occupy vector indices 0..36, in order.
const ALPHANUMERIC: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors used for
/// similarity comparison. Embedding is total: every implementation returns a
/// vector for any text, including the empty string, and two calls on
/// identical input return identical vectors.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl std::future::Future<Output = Vec<f32>> + Send;

    /// Return the dimensionality of vectors produced by this generator.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingGenerator`] for dynamic dispatch.
///
/// Because `EmbeddingGenerator::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Arc<dyn DynEmbeddingGenerator>` to be stored in structs without generics.
///
/// A blanket implementation is provided so that every `EmbeddingGenerator`
/// automatically implements `DynEmbeddingGenerator`.
pub trait DynEmbeddingGenerator: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Vec<f32>> + Send + 'a>>;

    /// Return the dimensionality of vectors produced by this generator.
    fn dimensions(&self) -> usize;
}

/// Blanket impl: any `EmbeddingGenerator` automatically implements
/// `DynEmbeddingGenerator`.
impl<T: EmbeddingGenerator> DynEmbeddingGenerator for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Vec<f32>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingGenerator::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// FallbackEmbedder - deterministic character/word/hash features
// ---------------------------------------------------------------------------

/// Deterministic embedding from surface features of the text.
///
/// Layout of the 384-dimensional output:
/// - 0..36: frequency of each of `a-z0-9` relative to total character count
/// - 50: average word length / 20
/// - 51: word count / 100, capped at 1.0
/// - 52..72: first 20 hex digits of the MD5 of the lower-cased text, each
///   divided by 15
/// - everything else stays 0.0
#[derive(Debug, Clone, Default)]
pub struct FallbackEmbedder;

impl FallbackEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Compute the feature vector. Pure and total; the empty string yields
    /// zeros everywhere except the hash region.
    pub fn vector_for(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut embedding = vec![0.0f32; EMBEDDING_DIM];

        // Character frequencies, normalized by the full character count
        // (whitespace and punctuation count toward the denominator but are
        // never in the numerator).
        let total_chars = text.chars().count();
        if total_chars > 0 {
            let mut counts = [0usize; 36];
            for ch in text.chars() {
                if let Some(i) = ALPHANUMERIC.find(ch) {
                    counts[i] += 1;
                }
            }
            for (i, count) in counts.iter().enumerate() {
                embedding[i] = *count as f32 / total_chars as f32;
            }
        }

        // Word statistics.
        let words: Vec<&str> = text.split_whitespace().collect();
        if !words.is_empty() {
            let avg_word_len =
                words.iter().map(|w| w.chars().count()).sum::<usize>() as f32 / words.len() as f32;
            embedding[50] = avg_word_len / 20.0;
            embedding[51] = (words.len() as f32 / 100.0).min(1.0);
        }

        // First 20 hex digits of the MD5 digest, one nibble per index.
        let digest = Md5::digest(text.as_bytes());
        for i in 0..20 {
            let byte = digest[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            embedding[52 + i] = nibble as f32 / 15.0;
        }

        embedding
    }
}

impl EmbeddingGenerator for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Vec<f32> {
        Self::vector_for(text)
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

// ---------------------------------------------------------------------------
// ExternalModelEmbedder - ONNX Runtime inference with automatic fallback
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed embedding generator using a sentence-transformer model.
///
/// Expects a model directory containing:
/// - `model.onnx`  — the sentence-transformer ONNX export
/// - `tokenizer.json` — the HuggingFace fast-tokenizer file
///
/// The model must produce 384-dimensional token embeddings so its output is
/// interchangeable with [`FallbackEmbedder`] inside one index. Mean pooling
/// (masked) and L2 normalization are applied to produce a single vector per
/// input. Inference failures are logged and answered with the fallback
/// vector instead of an error.
pub struct ExternalModelEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    fallback: FallbackEmbedder,
}

// ort::Session is Send + Sync internally (uses Arc<SharedSessionInner>).
unsafe impl Send for ExternalModelEmbedder {}
unsafe impl Sync for ExternalModelEmbedder {}

impl std::fmt::Debug for ExternalModelEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalModelEmbedder").finish()
    }
}

impl ExternalModelEmbedder {
    /// Load a sentence-transformer model from the given directory.
    ///
    /// The directory must contain `model.onnx` and `tokenizer.json`.
    pub fn from_directory(model_dir: &Path) -> Result<Self, QbankError> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
        )
    }

    /// Load from explicit model and tokenizer file paths.
    pub fn from_files(model_path: &Path, tokenizer_path: &Path) -> Result<Self, QbankError> {
        if !model_path.exists() {
            return Err(QbankError::Search(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(QbankError::Search(format!(
                "Tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| QbankError::Search(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| QbankError::Search(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| QbankError::Search(format!("ONNX load model: {}", e)))?;

        // Sentence-transformer output is [batch, seq_len, hidden_dim]; the
        // hidden dimension must match the fallback so both can feed one index.
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { EMBEDDING_DIM })
            .unwrap_or(EMBEDDING_DIM);
        if dimensions != EMBEDDING_DIM {
            return Err(QbankError::Search(format!(
                "Model produces {}-dimensional embeddings, expected {}",
                dimensions, EMBEDDING_DIM
            )));
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| QbankError::Search(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            model = %model_path.display(),
            dimensions,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            fallback: FallbackEmbedder::new(),
        })
    }

    /// Tokenize, run inference, and mean-pool the output.
    fn run_inference(
        session: &Mutex<Session>,
        tokenizer: &Tokenizer,
        text: &str,
    ) -> Result<Vec<f32>, QbankError> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| QbankError::Search(format!("Tokenization failed: {}", e)))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| t as i64)
            .collect();

        let seq_len = input_ids.len();

        let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| QbankError::Search(format!("input_ids array: {}", e)))?;
        let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| QbankError::Search(format!("attention_mask array: {}", e)))?;
        let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| QbankError::Search(format!("token_type_ids array: {}", e)))?;

        let ids_ref = TensorRef::from_array_view(&ids_array)
            .map_err(|e| QbankError::Search(format!("TensorRef input_ids: {}", e)))?;
        let mask_ref = TensorRef::from_array_view(&mask_array)
            .map_err(|e| QbankError::Search(format!("TensorRef attention_mask: {}", e)))?;
        let type_ref = TensorRef::from_array_view(&type_array)
            .map_err(|e| QbankError::Search(format!("TensorRef token_type_ids: {}", e)))?;

        let mut session = session
            .lock()
            .map_err(|e| QbankError::Search(format!("Session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![ids_ref, mask_ref, type_ref])
            .map_err(|e| QbankError::Search(format!("ONNX inference failed: {}", e)))?;

        // Token embeddings as a flat slice: [1, seq_len, hidden_dim].
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| QbankError::Search(format!("Extract embeddings: {}", e)))?;

        let shape_dims: Vec<i64> = shape.iter().copied().collect();
        if shape_dims.len() < 2 {
            return Err(QbankError::Search(format!(
                "Unexpected output shape: {:?}",
                shape_dims
            )));
        }

        let hidden_dim = *shape_dims.last().unwrap() as usize;

        // Mean pooling over the sequence dimension, masked by attention_mask.
        let mut pooled = vec![0.0f32; hidden_dim];
        let mut count = 0.0f32;

        for (tok_idx, &mask_val) in attention_mask.iter().enumerate() {
            if mask_val > 0 {
                let offset = tok_idx * hidden_dim;
                for dim in 0..hidden_dim {
                    pooled[dim] += data[offset + dim];
                }
                count += 1.0;
            }
        }

        if count > 0.0 {
            for val in &mut pooled {
                *val /= count;
            }
        }

        // L2-normalize the embedding.
        let norm: f32 = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut pooled {
                *val /= norm;
            }
        }

        Ok(pooled)
    }
}

impl EmbeddingGenerator for ExternalModelEmbedder {
    async fn embed(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            // The tokenizer has nothing to encode; the fallback defines the
            // empty-string vector.
            return FallbackEmbedder::vector_for(text);
        }

        // ONNX Runtime inference is CPU-bound; run on a blocking thread.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text_owned = text.to_string();

        let result = tokio::task::spawn_blocking(move || {
            Self::run_inference(&session, &tokenizer, &text_owned)
        })
        .await;

        match result {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                warn!(error = %e, "External embedding failed, using fallback");
                self.fallback.embed(text).await
            }
            Err(e) => {
                warn!(error = %e, "Embedding task panicked, using fallback");
                self.fallback.embed(text).await
            }
        }
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_dimension() {
        let generator = FallbackEmbedder::new();
        let vec = generator.embed("hello world").await;
        assert_eq!(vec.len(), 384);
    }

    #[tokio::test]
    async fn test_fallback_dimension_empty_string() {
        let generator = FallbackEmbedder::new();
        let vec = generator.embed("").await;
        assert_eq!(vec.len(), 384);
    }

    #[tokio::test]
    async fn test_fallback_deterministic() {
        let generator = FallbackEmbedder::new();
        let v1 = generator.embed("same text").await;
        let v2 = generator.embed("same text").await;
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_fallback_case_insensitive() {
        let generator = FallbackEmbedder::new();
        let lower = generator.embed("the indian navy").await;
        let mixed = generator.embed("The Indian NAVY").await;
        assert_eq!(lower, mixed);
    }

    #[tokio::test]
    async fn test_fallback_different_inputs() {
        let generator = FallbackEmbedder::new();
        let v1 = generator.embed("text one").await;
        let v2 = generator.embed("text two").await;
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_char_frequency_features() {
        // "a a" has 3 characters total, two of which are 'a'.
        let vec = FallbackEmbedder::vector_for("a a");
        assert!((vec[0] - 2.0 / 3.0).abs() < 1e-6);
        // 'b' never occurs.
        assert_eq!(vec[1], 0.0);
        // Two words of average length 1.
        assert!((vec[50] - 1.0 / 20.0).abs() < 1e-6);
        assert!((vec[51] - 2.0 / 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_digit_frequency_features() {
        // "42" -> '4' at alphabet index 30, '2' at index 28.
        let vec = FallbackEmbedder::vector_for("42");
        assert!((vec[30] - 0.5).abs() < 1e-6);
        assert!((vec[28] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_punctuation_counts_toward_length_only() {
        // 5 characters, 4 of them alphanumeric.
        let vec = FallbackEmbedder::vector_for("ab,cd");
        assert!((vec[0] - 0.2).abs() < 1e-6);
        assert!((vec[1] - 0.2).abs() < 1e-6);
        assert!((vec[2] - 0.2).abs() < 1e-6);
        assert!((vec[3] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_hash_features_known_digest() {
        // md5("abc") = 900150983cd24fb0d6963f7d28e17f72.
        let vec = FallbackEmbedder::vector_for("abc");
        assert!((vec[52] - 9.0 / 15.0).abs() < 1e-6); // '9'
        assert_eq!(vec[53], 0.0); // '0'
        assert!((vec[55] - 1.0 / 15.0).abs() < 1e-6); // '1'
        assert!((vec[61] - 12.0 / 15.0).abs() < 1e-6); // 'c'
        assert!((vec[65] - 1.0).abs() < 1e-6); // 'f'
    }

    #[test]
    fn test_empty_string_vector() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e.
        let vec = FallbackEmbedder::vector_for("");
        for i in 0..52 {
            assert_eq!(vec[i], 0.0, "index {} should be zero", i);
        }
        assert!((vec[52] - 13.0 / 15.0).abs() < 1e-6); // 'd'
        assert!((vec[53] - 4.0 / 15.0).abs() < 1e-6); // '4'
        for i in 72..384 {
            assert_eq!(vec[i], 0.0, "index {} should be zero", i);
        }
    }

    #[test]
    fn test_word_count_capped() {
        let many_words = "w ".repeat(250);
        let vec = FallbackEmbedder::vector_for(&many_words);
        assert!((vec[51] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_fallback_values_in_range() {
        let generator = FallbackEmbedder::new();
        let vec = generator.embed("test range 0123456789").await;
        for val in &vec {
            assert!(
                (0.0..=1.0).contains(val),
                "Value {} out of range [0, 1]",
                val
            );
        }
    }

    #[tokio::test]
    async fn test_dimensions_accessor() {
        let generator = FallbackEmbedder::new();
        assert_eq!(EmbeddingGenerator::dimensions(&generator), 384);
    }

    #[tokio::test]
    async fn test_dyn_generator_object() {
        let generator: Arc<dyn DynEmbeddingGenerator> = Arc::new(FallbackEmbedder::new());
        let vec = generator.embed_boxed("dynamic dispatch").await;
        assert_eq!(vec.len(), 384);
        assert_eq!(generator.dimensions(), 384);
    }

    #[test]
    fn test_external_missing_model() {
        let result = ExternalModelEmbedder::from_directory(Path::new("/nonexistent"));
        assert!(result.is_err());
    }
}
