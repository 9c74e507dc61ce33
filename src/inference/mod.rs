pub mod bi_encoder;
pub mod embedder;
pub mod similarity;

pub use bi_encoder::EmbeddingModel;
pub use embedder::{Embedder, InferenceGate, MemoStats, MemoizedEmbedder, OnnxEmbedder};
pub use similarity::cosine;
