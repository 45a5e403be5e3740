use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;
use tracing::info;

use crate::{embedder::Embedder, error::Result};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "RENTRANK_MODEL";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// ColBERT-backed [`Embedder`], loaded lazily on first use.
///
/// ColBERT produces one embedding per token; these are sum-pooled into a
/// single vector per text. Queries go through ColBERT's query encoder, which
/// expands short queries with `[MASK]` tokens. Those tokens have their own
/// embeddings and are part of the pooled query vector. Descriptions go
/// through the document encoder.
pub struct ColbertEmbedder {
    model: Option<ColBERT>,
    model_id: String,
}

impl Default for ColbertEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColbertEmbedder {
    /// Creates a new `ColbertEmbedder`. The model ID is resolved from:
    /// 1. The `RENTRANK_MODEL` environment variable, if set
    /// 2. Otherwise, the default model (`lightonai/GTE-ModernColBERT-v1`)
    pub fn new() -> Self {
        let model_id = std::env::var(MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    /// Creates a `ColbertEmbedder` with an explicit model ID, bypassing
    /// environment variable resolution.
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        let model = match self.model.take() {
            Some(model) => model,
            None => {
                info!(model = %self.model_id, "loading embedding model");
                ColBERT::from(&self.model_id)
                    .with_device(default_device())
                    .try_into()?
            }
        };
        Ok(self.model.insert(model))
    }

    /// Encode texts and pool each `[T, D]` token matrix into one `D` vector.
    fn encode_pooled(&mut self, texts: &[String], is_query: bool) -> Result<Vec<Vec<f32>>> {
        let model = self.ensure_loaded()?;
        // [batch, tokens, dimension] -> [batch, dimension]
        let embeddings: Tensor = model.encode(texts, is_query)?;
        let pooled = embeddings.sum(1)?.to_device(&Device::Cpu)?;
        Ok(pooled.to_vec2::<f32>()?)
    }
}

impl Embedder for ColbertEmbedder {
    fn model_version(&self) -> &str {
        &self.model_id
    }

    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut pooled = self.encode_pooled(&[text.to_string()], true)?;
        Ok(pooled.pop().unwrap_or_default())
    }

    fn embed_documents(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.encode_pooled(texts, false)
    }
}
