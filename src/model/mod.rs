mod gpt2;
mod loader;

pub use gpt2::Gpt2Model;
pub use loader::load_model_files;

use candle_core::Tensor;

use crate::error::Result;

/// A causal language model that produces next-token logits.
pub trait LanguageModel: Send + Sync {
    /// Runs `input_ids` (shape `[1, seq]`) starting at absolute `position`,
    /// appending to the KV cache, and returns logits for the last position.
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor>;

    /// Drops the KV cache so the next call starts a fresh sequence.
    fn reset_cache(&mut self);

    fn eos_token_id(&self) -> u32;

    fn vocab_size(&self) -> usize;

    /// Longest sequence the position embeddings cover.
    fn max_positions(&self) -> usize;
}
