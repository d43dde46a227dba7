//! Fixtures shared by the unit tests: a byte-level tokenizer and a scripted
//! language model, so generation and routing run without downloaded weights.

use std::sync::Arc;

use candle_core::{Device, Tensor};

use crate::config::GenerationConfig;
use crate::error::{Result, ServiceError};
use crate::model::LanguageModel;
use crate::service::ModelService;
use crate::tokenizer::TokenizerWrapper;

/// Id of `<|endoftext|>` in [`byte_tokenizer`].
pub const EOS: u32 = 256;
pub const VOCAB: usize = 257;

/// Byte-level BPE with one token per byte (id == byte value) and no merges,
/// using GPT-2's byte-to-unicode table, plus `<|endoftext|>` as a special
/// token.
pub fn byte_tokenizer() -> TokenizerWrapper {
    let mut vocab = serde_json::Map::new();
    let mut n = 256u32;
    for b in 0u32..256 {
        let printable =
            (33..=126).contains(&b) || (161..=172).contains(&b) || (174..=255).contains(&b);
        let ch = if printable {
            char::from_u32(b).unwrap()
        } else {
            let c = char::from_u32(n).unwrap();
            n += 1;
            c
        };
        vocab.insert(ch.to_string(), serde_json::json!(b));
    }
    vocab.insert("<|endoftext|>".to_string(), serde_json::json!(EOS));

    let json = serde_json::json!({
        "version": "1.0",
        "added_tokens": [{
            "id": EOS,
            "content": "<|endoftext|>",
            "single_word": false,
            "lstrip": false,
            "rstrip": false,
            "normalized": false,
            "special": true
        }],
        "model": {
            "type": "BPE",
            "vocab": vocab,
            "merges": []
        },
        "pre_tokenizer": {
            "type": "ByteLevel",
            "add_prefix_space": false,
            "trim_offsets": true
        },
        "decoder": {
            "type": "ByteLevel",
            "add_prefix_space": true,
            "trim_offsets": true,
            "use_regex": true
        }
    });
    let bytes = serde_json::to_vec(&json).unwrap();
    TokenizerWrapper::from_tokenizer(tokenizers::Tokenizer::from_bytes(bytes).unwrap())
}

/// Emits `script` one token per forward call, then EOS forever.
pub struct ScriptedModel {
    script: Vec<u32>,
    step: usize,
    fail: bool,
    max_positions: usize,
}

impl ScriptedModel {
    pub fn speaking(text: &str) -> Self {
        Self {
            script: text.bytes().map(u32::from).collect(),
            step: 0,
            fail: false,
            max_positions: 1024,
        }
    }

    pub fn silent() -> Self {
        Self::speaking("")
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::silent()
        }
    }

    pub fn with_max_positions(mut self, max_positions: usize) -> Self {
        self.max_positions = max_positions;
        self
    }
}

impl LanguageModel for ScriptedModel {
    fn forward(&mut self, _input_ids: &Tensor, _position: usize) -> Result<Tensor> {
        if self.fail {
            return Err(ServiceError::Generation("scripted failure".to_string()));
        }
        let next = self.script.get(self.step).copied().unwrap_or(EOS);
        self.step += 1;

        let mut logits = vec![0f32; VOCAB];
        logits[next as usize] = 100.0;
        Ok(Tensor::from_vec(logits, (1, VOCAB), &Device::Cpu)?)
    }

    fn reset_cache(&mut self) {
        self.step = 0;
    }

    fn eos_token_id(&self) -> u32 {
        EOS
    }

    fn vocab_size(&self) -> usize {
        VOCAB
    }

    fn max_positions(&self) -> usize {
        self.max_positions
    }
}

pub fn scripted_service(model: ScriptedModel) -> Arc<ModelService> {
    let config = GenerationConfig {
        seed: Some(7),
        ..GenerationConfig::default()
    };
    Arc::new(ModelService::new(
        Box::new(model),
        byte_tokenizer(),
        Device::Cpu,
        "distilgpt2".to_string(),
        config,
    ))
}
