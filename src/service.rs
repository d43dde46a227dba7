//! The process-wide model service: one tokenizer/model pair, loaded once
//! before the server starts and shared by every request.

use std::sync::Mutex;

use candle_core::Device;
use tracing::{debug, info};

use crate::config::{Args, GenerationConfig};
use crate::device::{device_name, select_device};
use crate::error::{Result, ServiceError};
use crate::generation::TextGenerator;
use crate::model::{load_model_files, Gpt2Model, LanguageModel};
use crate::tokenizer::TokenizerWrapper;

/// Returned instead of an empty continuation.
pub const FALLBACK_REPLY: &str = "I generated a response!";

pub struct ModelService {
    // Generation mutates the KV cache, so calls take turns.
    model: Mutex<Box<dyn LanguageModel>>,
    tokenizer: TokenizerWrapper,
    device: Device,
    model_id: String,
    config: GenerationConfig,
}

impl ModelService {
    pub fn new(
        model: Box<dyn LanguageModel>,
        tokenizer: TokenizerWrapper,
        device: Device,
        model_id: String,
        config: GenerationConfig,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            model_id,
            config,
        }
    }

    /// Downloads (or reads) the pretrained files and builds the model.
    /// Any failure here is fatal for the process.
    pub fn load(args: &Args) -> Result<Self> {
        let device = select_device(args.cpu)?;
        info!("Using device: {}", device_name(&device));

        let files = load_model_files(&args.model, &args.revision, args.hf_token.as_deref())?;
        let tokenizer = TokenizerWrapper::load(&files.tokenizer)?;
        let model = Gpt2Model::load(&files.config, &files.weights, &device)?;

        if tokenizer.vocab_size() > model.vocab_size() {
            return Err(ServiceError::ModelLoad(format!(
                "tokenizer has {} tokens but the model only {}",
                tokenizer.vocab_size(),
                model.vocab_size()
            )));
        }

        Ok(Self::new(
            Box::new(model),
            tokenizer,
            device,
            args.model.clone(),
            GenerationConfig::from(args),
        ))
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn device_name(&self) -> &'static str {
        device_name(&self.device)
    }

    /// Samples a continuation of `prompt` and returns it without the echoed
    /// prompt. The result may be empty; see [`ModelService::reply`].
    pub fn generate(&self, prompt: &str) -> Result<String> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| ServiceError::Generation("model lock poisoned".to_string()))?;

        let mut generator = TextGenerator::new(model.as_mut(), &self.tokenizer, &self.device);
        let output = generator.generate(prompt, &self.config)?;
        debug!(
            "{} new tokens at {:.2} tokens/sec, {}ms total",
            output.tokens.len(),
            output.tokens_per_second,
            output.total_time_ms
        );

        Ok(strip_prompt(&output.text, prompt))
    }

    /// [`ModelService::generate`], with an empty result replaced by
    /// [`FALLBACK_REPLY`].
    pub fn reply(&self, prompt: &str) -> Result<String> {
        let text = self.generate(prompt)?;
        if text.is_empty() {
            Ok(FALLBACK_REPLY.to_string())
        } else {
            Ok(text)
        }
    }
}

/// Removes `prompt` from the front of `text` and trims what is left. Text
/// that does not start with the prompt is returned untouched.
pub fn strip_prompt(text: &str, prompt: &str) -> String {
    match text.strip_prefix(prompt) {
        Some(rest) => rest.trim().to_string(),
        None => text.to_string(),
    }
}
