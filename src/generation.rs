use std::time::Instant;

use candle_core::{Device, Tensor};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{Result, ServiceError};
use crate::model::LanguageModel;
use crate::sampling::Sampler;
use crate::tokenizer::TokenizerWrapper;

pub struct GenerationOutput {
    /// Prompt and continuation decoded together, special tokens removed.
    pub text: String,
    /// Newly sampled token ids, EOS excluded.
    pub tokens: Vec<u32>,
    pub tokens_per_second: f64,
    pub total_time_ms: u128,
}

pub struct TextGenerator<'a> {
    model: &'a mut dyn LanguageModel,
    tokenizer: &'a TokenizerWrapper,
    device: &'a Device,
}

impl<'a> TextGenerator<'a> {
    pub fn new(
        model: &'a mut dyn LanguageModel,
        tokenizer: &'a TokenizerWrapper,
        device: &'a Device,
    ) -> Self {
        Self {
            model,
            tokenizer,
            device,
        }
    }

    pub fn generate(
        &mut self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationOutput> {
        let start_time = Instant::now();

        self.model.reset_cache();

        let prompt_tokens = self.tokenizer.encode_truncated(prompt, config.max_prompt_tokens)?;
        let prompt_len = prompt_tokens.len();
        info!("Prompt tokens: {}", prompt_len);

        if prompt_tokens.is_empty() {
            return Err(ServiceError::Generation("Empty prompt".to_string()));
        }

        let mut sampler = if config.do_sample {
            Sampler::new(config.temperature, config.top_p, config.top_k, config.seed)
        } else {
            Sampler::greedy()
        };

        let eos_token = self.tokenizer.eos_token_id().unwrap_or(self.model.eos_token_id());
        let total_len = config.max_length.min(self.model.max_positions());
        let max_new_tokens = total_len.saturating_sub(prompt_len);

        let mut generated_tokens: Vec<u32> = Vec::new();
        let generation_start = Instant::now();

        if max_new_tokens > 0 {
            let input = Tensor::new(prompt_tokens.as_slice(), self.device)?.unsqueeze(0)?;
            let mut logits = self.model.forward(&input, 0)?;

            for i in 0..max_new_tokens {
                let next_token = sampler.sample(&logits)?;
                if next_token == eos_token {
                    debug!("EOS generated at step {}", i);
                    break;
                }
                generated_tokens.push(next_token);

                if i + 1 == max_new_tokens {
                    break;
                }
                let input = Tensor::new(&[next_token], self.device)?.unsqueeze(0)?;
                logits = self.model.forward(&input, prompt_len + i)?;
            }
        }

        let generation_time = generation_start.elapsed();
        let tokens_per_second = if generation_time.as_secs_f64() > 0.0 {
            generated_tokens.len() as f64 / generation_time.as_secs_f64()
        } else {
            0.0
        };

        let mut all_tokens = prompt_tokens;
        all_tokens.extend_from_slice(&generated_tokens);
        let text = self.tokenizer.decode(&all_tokens)?;

        info!(
            "Generated {} tokens in {:?} ({:.2} tokens/sec)",
            generated_tokens.len(),
            generation_time,
            tokens_per_second
        );

        Ok(GenerationOutput {
            text,
            tokens: generated_tokens,
            tokens_per_second,
            total_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{byte_tokenizer, ScriptedModel};

    fn run(
        model: &mut ScriptedModel,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationOutput> {
        let tokenizer = byte_tokenizer();
        let device = Device::Cpu;
        TextGenerator::new(model, &tokenizer, &device).generate(prompt, config)
    }

    #[test]
    fn decodes_prompt_and_continuation_together() {
        let mut model = ScriptedModel::speaking(" world");
        let output = run(&mut model, "Hello", &GenerationConfig::default()).unwrap();

        assert_eq!(output.text, "Hello world");
        assert_eq!(output.tokens.len(), " world".len());
    }

    #[test]
    fn total_length_is_capped() {
        let mut model = ScriptedModel::speaking("abcdefghij");
        let config = GenerationConfig {
            max_length: 8,
            ..GenerationConfig::default()
        };
        let output = run(&mut model, "12345", &config).unwrap();

        assert_eq!(output.text, "12345abc");
    }

    #[test]
    fn prompt_is_truncated_before_generation() {
        let mut model = ScriptedModel::silent();
        let config = GenerationConfig {
            max_prompt_tokens: 4,
            ..GenerationConfig::default()
        };
        let output = run(&mut model, "truncate me", &config).unwrap();

        assert_eq!(output.text, "trun");
        assert!(output.tokens.is_empty());
    }

    #[test]
    fn model_position_limit_bounds_generation() {
        let mut model = ScriptedModel::speaking("xyzxyz").with_max_positions(4);
        let output = run(&mut model, "ab", &GenerationConfig::default()).unwrap();

        assert_eq!(output.text, "abxy");
    }

    #[test]
    fn cache_is_reset_between_calls() {
        let mut model = ScriptedModel::speaking("!");
        let first = run(&mut model, "a", &GenerationConfig::default()).unwrap();
        let second = run(&mut model, "b", &GenerationConfig::default()).unwrap();

        assert_eq!(first.text, "a!");
        assert_eq!(second.text, "b!");
    }

    #[test]
    fn greedy_decoding_follows_the_top_logit() {
        let mut model = ScriptedModel::speaking(" next");
        let config = GenerationConfig {
            do_sample: false,
            ..GenerationConfig::default()
        };
        let output = run(&mut model, "what comes", &config).unwrap();

        assert_eq!(output.text, "what comes next");
    }

    #[test]
    fn model_errors_propagate() {
        let mut model = ScriptedModel::failing();
        let err = run(&mut model, "hi", &GenerationConfig::default()).err().unwrap();
        assert!(matches!(err, ServiceError::Generation(_)));
    }
}
