use std::path::Path;

use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{Result, ServiceError};

pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
}

impl TokenizerWrapper {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading tokenizer from {:?}", path);
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| ServiceError::Tokenizer(e.to_string()))?;

        info!("Tokenizer loaded with {} tokens", tokenizer.get_vocab_size(true));
        Ok(Self { tokenizer })
    }

    #[cfg(test)]
    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;

        Ok(encoding.get_ids().to_vec())
    }

    /// Encodes and keeps at most the first `max_tokens` ids.
    pub fn encode_truncated(&self, text: &str, max_tokens: usize) -> Result<Vec<u32>> {
        let mut ids = self.encode(text)?;
        ids.truncate(max_tokens);
        Ok(ids)
    }

    /// Decodes with special tokens removed.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.tokenizer
            .token_to_id("<|endoftext|>")
            .or_else(|| self.tokenizer.token_to_id("</s>"))
            .or_else(|| self.tokenizer.token_to_id("<eos>"))
    }
}
