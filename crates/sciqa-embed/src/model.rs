use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::Config as BertConfig;
use sciqa_core::config::expand_path;
use sciqa_core::{Error, Result};
use tokenizers::Tokenizer;
use tracing::info;

/// Tokenizer, config and weights loaded from one model directory.
pub struct ModelFiles {
    pub tokenizer: Tokenizer,
    pub config: BertConfig,
    pub weights: VarBuilder<'static>,
}

pub fn resolve_model_dir(configured: &str, encoder: &str) -> Result<PathBuf> {
    let dir = expand_path(configured);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(Error::encoding(encoder, format!("model directory not found: {}", dir.display())))
    }
}

/// Load `tokenizer.json`, `config.json` and `model.safetensors` (or `pytorch_model.bin`).
pub fn load_model_files(dir: &Path, device: &Device, encoder: &str) -> Result<ModelFiles> {
    let tokenizer_path = dir.join("tokenizer.json");
    let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
        Error::encoding(encoder, format!("failed to load tokenizer from {}: {e}", tokenizer_path.display()))
    })?;

    let config_path = dir.join("config.json");
    let raw = std::fs::read_to_string(&config_path)
        .map_err(|e| Error::encoding(encoder, format!("failed to read {}: {e}", config_path.display())))?;
    let config: BertConfig = serde_json::from_str(&raw)
        .map_err(|e| Error::encoding(encoder, format!("invalid {}: {e}", config_path.display())))?;

    let safetensors = dir.join("model.safetensors");
    let pickle = dir.join("pytorch_model.bin");
    let weights = if safetensors.exists() {
        // SAFETY: the weight file is not modified while the model is alive.
        unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device) }
    } else if pickle.exists() {
        VarBuilder::from_pth(&pickle, DType::F32, device)
    } else {
        return Err(Error::encoding(encoder, format!("no model weights in {}", dir.display())));
    }
    .map_err(|e| Error::encoding(encoder, e))?;

    info!(encoder, dir = %dir.display(), "model files loaded");
    Ok(ModelFiles { tokenizer, config, weights })
}
