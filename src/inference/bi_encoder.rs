//! Sentence-embedding model for queries and tool descriptors.
//!
//! Runs a MiniLM-style bi-encoder exported to ONNX. Query and tool texts are
//! encoded independently into L2-normalized vectors, so tool embeddings can be
//! computed once at index time.

use crate::error::{AppError, Result};
use crate::inference::similarity::normalize;
use crossbeam::queue::ArrayQueue;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::path::Path;
use std::sync::Mutex;
use tokenizers::Tokenizer;

/// A pool of ONNX sessions sharing one tokenizer.
///
/// `Session::run` needs `&mut Session`. Each concurrent encode pops a session
/// index from a lock-free queue, so the per-session mutex is never contended.
pub struct EmbeddingModel {
    sessions: Vec<Mutex<Session>>,
    available: ArrayQueue<usize>,
    tokenizer: Tokenizer,
    max_length: usize,
    dimension: usize,
}

impl EmbeddingModel {
    /// Load the model into `pool_size` sessions and run one warmup encode,
    /// which also determines the embedding dimension.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_length: usize,
        pool_size: usize,
    ) -> Result<Self> {
        let pool_size = pool_size.max(1);

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            AppError::TokenizationError(format!("Failed to load tokenizer: {}", e))
        })?;

        let model_bytes = std::fs::read(model_path).map_err(|e| {
            AppError::EmbeddingError(format!(
                "Failed to read model file {}: {}",
                model_path.display(),
                e
            ))
        })?;

        let mut sessions = Vec::with_capacity(pool_size);
        let available = ArrayQueue::new(pool_size);

        for i in 0..pool_size {
            let session = Session::builder()
                .map_err(|e| AppError::EmbeddingError(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| AppError::EmbeddingError(e.to_string()))?
                .with_intra_threads(1)
                .map_err(|e| AppError::EmbeddingError(e.to_string()))?
                .commit_from_memory(&model_bytes)
                .map_err(|e: ort::Error| AppError::EmbeddingError(e.to_string()))?;

            sessions.push(Mutex::new(session));
            available
                .push(i)
                .map_err(|_| AppError::EmbeddingError("Failed to initialize session pool".into()))?;
        }

        let mut model = Self {
            sessions,
            available,
            tokenizer,
            max_length,
            dimension: 0,
        };

        let warmup = model.encode_batch(&["warmup query".to_string()])?;
        model.dimension = warmup.first().map(Vec::len).unwrap_or(0);
        if model.dimension == 0 {
            return Err(AppError::EmbeddingError(
                "Warmup produced an empty embedding".into(),
            ));
        }

        tracing::info!(
            model = %model_path.display(),
            tokenizer = %tokenizer_path.display(),
            max_length,
            pool_size,
            dimension = model.dimension,
            "Embedding model loaded"
        );

        Ok(model)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of ONNX sessions, and so the most encodes that can run at once.
    pub fn pool_size(&self) -> usize {
        self.sessions.len()
    }

    fn acquire_session(&self) -> Result<usize> {
        self.available
            .pop()
            .ok_or_else(|| AppError::ResourceError("No available embedding sessions".into()))
    }

    fn release_session(&self, index: usize) {
        let _ = self.available.push(index);
    }

    /// Encode a batch of texts into normalized embedding vectors.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session_idx = self.acquire_session()?;
        let result = self.encode_on_session(session_idx, texts);
        self.release_session(session_idx);
        result
    }

    fn encode_on_session(&self, session_idx: usize, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| AppError::TokenizationError(e.to_string()))?;

        let batch_size = encodings.len();

        // Pad to the longest sequence in the batch, capped at max_length
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(1)
            .max(1);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let shape = [batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e| AppError::EmbeddingError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| AppError::EmbeddingError(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| AppError::EmbeddingError(e.to_string()))?;

        let mut session = self.sessions[session_idx]
            .lock()
            .map_err(|_| AppError::EmbeddingError("Embedding session poisoned".into()))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| AppError::EmbeddingError(format!("Embedding inference failed: {}", e)))?;

        let hidden_state = outputs.get("last_hidden_state").ok_or_else(|| {
            AppError::EmbeddingError("No 'last_hidden_state' output found".to_string())
        })?;

        let (shape_info, data) = hidden_state
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::EmbeddingError(e.to_string()))?;
        let hidden_size = shape_info[2] as usize;

        Ok(mean_pool(data, &attention_mask, batch_size, max_len, hidden_size))
    }
}

/// Attention-masked mean pooling over token states, followed by L2 normalization.
///
/// `hidden` is row-major `(batch, seq_len, hidden_size)`.
pub(crate) fn mean_pool(
    hidden: &[f32],
    attention_mask: &[i64],
    batch_size: usize,
    seq_len: usize,
    hidden_size: usize,
) -> Vec<Vec<f32>> {
    let mut embeddings = Vec::with_capacity(batch_size);

    for i in 0..batch_size {
        let mut sum = vec![0.0f32; hidden_size];
        let mut count = 0.0f32;

        for j in 0..seq_len {
            if attention_mask[i * seq_len + j] == 1 {
                let base = i * seq_len * hidden_size + j * hidden_size;
                for (k, acc) in sum.iter_mut().enumerate() {
                    *acc += hidden[base + k];
                }
                count += 1.0;
            }
        }

        if count > 0.0 {
            for acc in sum.iter_mut() {
                *acc /= count;
            }
        }
        normalize(&mut sum);
        embeddings.push(sum);
    }

    embeddings
}
