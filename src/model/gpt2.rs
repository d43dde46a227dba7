use std::path::Path;

use candle_core::{DType, Device, IndexOp, Module, Result as CandleResult, Tensor, D};
use candle_nn::{embedding, layer_norm, Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;
use tracing::info;

use super::LanguageModel;
use crate::error::{Result, ServiceError};

/// GPT-2 `config.json`, covering DistilGPT-2 as well.
#[derive(Debug, Clone, Deserialize)]
pub struct Gpt2Config {
    pub vocab_size: usize,
    #[serde(default = "default_n_positions")]
    pub n_positions: usize,
    pub n_embd: usize,
    pub n_layer: usize,
    pub n_head: usize,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
    #[serde(default = "default_eos_token_id")]
    pub eos_token_id: u32,
}

fn default_n_positions() -> usize {
    1024
}

fn default_layer_norm_epsilon() -> f64 {
    1e-5
}

fn default_eos_token_id() -> u32 {
    50256
}

// GPT-2 stores projections as Conv1D with weight [in, out]; candle's Linear
// wants [out, in].
fn conv1d(in_dim: usize, out_dim: usize, vb: VarBuilder) -> CandleResult<Linear> {
    let weight = vb.get((in_dim, out_dim), "weight")?.t()?.contiguous()?;
    let bias = vb.get(out_dim, "bias")?;
    Ok(Linear::new(weight, Some(bias)))
}

struct Attention {
    c_attn: Linear,
    c_proj: Linear,
    n_head: usize,
    head_dim: usize,
    kv_cache: Option<(Tensor, Tensor)>,
}

impl Attention {
    fn new(config: &Gpt2Config, vb: VarBuilder) -> CandleResult<Self> {
        let n_embd = config.n_embd;
        Ok(Self {
            c_attn: conv1d(n_embd, 3 * n_embd, vb.pp("c_attn"))?,
            c_proj: conv1d(n_embd, n_embd, vb.pp("c_proj"))?,
            n_head: config.n_head,
            head_dim: n_embd / config.n_head,
            kv_cache: None,
        })
    }

    fn split_heads(&self, x: &Tensor, batch: usize, seq_len: usize) -> CandleResult<Tensor> {
        x.reshape((batch, seq_len, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(&mut self, x: &Tensor) -> CandleResult<Tensor> {
        let (batch, seq_len, n_embd) = x.dims3()?;

        let qkv = self.c_attn.forward(x)?;
        let q = self.split_heads(&qkv.narrow(D::Minus1, 0, n_embd)?, batch, seq_len)?;
        let k = self.split_heads(&qkv.narrow(D::Minus1, n_embd, n_embd)?, batch, seq_len)?;
        let v = self.split_heads(&qkv.narrow(D::Minus1, 2 * n_embd, n_embd)?, batch, seq_len)?;

        let (k, v) = match &self.kv_cache {
            Some((prev_k, prev_v)) => (
                Tensor::cat(&[prev_k, &k], 2)?,
                Tensor::cat(&[prev_v, &v], 2)?,
            ),
            None => (k, v),
        };
        self.kv_cache = Some((k.clone(), v.clone()));

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.t()?)? * scale)?;
        let scores = if seq_len > 1 {
            causal_mask(&scores)?
        } else {
            scores
        };

        let weights = candle_nn::ops::softmax_last_dim(&scores)?;
        let out = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, n_embd))?;

        self.c_proj.forward(&out)
    }

    fn clear_cache(&mut self) {
        self.kv_cache = None;
    }
}

/// Masks keys that lie after each query, where the queries are the last
/// `seq_len` of `kv_len` positions.
fn causal_mask(scores: &Tensor) -> CandleResult<Tensor> {
    let (_, _, seq_len, kv_len) = scores.dims4()?;
    let offset = kv_len - seq_len;
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|i| (0..kv_len).map(move |j| (i, j)))
        .map(|(i, j)| {
            if j > i + offset {
                f32::NEG_INFINITY
            } else {
                0.0
            }
        })
        .collect();
    let mask = Tensor::from_vec(mask, (1, 1, seq_len, kv_len), scores.device())?
        .to_dtype(scores.dtype())?;
    scores.broadcast_add(&mask)
}

struct Mlp {
    c_fc: Linear,
    c_proj: Linear,
}

impl Mlp {
    fn new(config: &Gpt2Config, vb: VarBuilder) -> CandleResult<Self> {
        let inner = 4 * config.n_embd;
        Ok(Self {
            c_fc: conv1d(config.n_embd, inner, vb.pp("c_fc"))?,
            c_proj: conv1d(inner, config.n_embd, vb.pp("c_proj"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> CandleResult<Tensor> {
        // gelu_new: the tanh approximation
        self.c_proj.forward(&self.c_fc.forward(x)?.gelu()?)
    }
}

struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn new(config: &Gpt2Config, vb: VarBuilder) -> CandleResult<Self> {
        let eps = config.layer_norm_epsilon;
        Ok(Self {
            ln_1: layer_norm(config.n_embd, eps, vb.pp("ln_1"))?,
            attn: Attention::new(config, vb.pp("attn"))?,
            ln_2: layer_norm(config.n_embd, eps, vb.pp("ln_2"))?,
            mlp: Mlp::new(config, vb.pp("mlp"))?,
        })
    }

    fn forward(&mut self, x: &Tensor) -> CandleResult<Tensor> {
        let x = (x + self.attn.forward(&self.ln_1.forward(x)?)?)?;
        &x + self.mlp.forward(&self.ln_2.forward(&x)?)?
    }
}

pub struct Gpt2Model {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    lm_head: Linear,
    config: Gpt2Config,
}

impl Gpt2Model {
    pub fn load(config_path: &Path, weights_path: &Path, device: &Device) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)?;
        let config: Gpt2Config = serde_json::from_str(&config_str)?;

        info!(
            "GPT-2 config: vocab_size={}, n_embd={}, n_layer={}, n_head={}, n_positions={}",
            config.vocab_size, config.n_embd, config.n_layer, config.n_head, config.n_positions
        );

        let dtype = if device.is_cuda() {
            DType::BF16
        } else {
            DType::F32
        };
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], dtype, device)? };

        Self::new(config, vb)
    }

    /// Builds the model from `vb`, accepting checkpoints saved with or
    /// without the `transformer.` prefix.
    pub fn new(config: Gpt2Config, vb: VarBuilder) -> Result<Self> {
        if config.n_head == 0 || config.n_embd % config.n_head != 0 {
            return Err(ServiceError::ModelLoad(format!(
                "n_embd {} is not divisible by n_head {}",
                config.n_embd, config.n_head
            )));
        }

        let vb = if vb.contains_tensor("transformer.wte.weight") {
            vb.pp("transformer")
        } else {
            vb
        };

        let wte = embedding(config.vocab_size, config.n_embd, vb.pp("wte"))?;
        let wpe = embedding(config.n_positions, config.n_embd, vb.pp("wpe"))?;

        let mut blocks = Vec::with_capacity(config.n_layer);
        for i in 0..config.n_layer {
            blocks.push(Block::new(&config, vb.pp(format!("h.{}", i)))?);
        }

        let ln_f = layer_norm(config.n_embd, config.layer_norm_epsilon, vb.pp("ln_f"))?;
        // Output projection is tied to the token embeddings.
        let lm_head = Linear::new(wte.embeddings().clone(), None);

        info!("GPT-2 model built with {} blocks", blocks.len());
        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            lm_head,
            config,
        })
    }
}

impl LanguageModel for Gpt2Model {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        if position + seq_len > self.config.n_positions {
            return Err(ServiceError::Generation(format!(
                "sequence of {} tokens exceeds the {} positions of the model",
                position + seq_len,
                self.config.n_positions
            )));
        }

        let start = position as u32;
        let end = (position + seq_len) as u32;
        let positions = Tensor::arange(start, end, input_ids.device())?.unsqueeze(0)?;
        let mut hidden = (self.wte.forward(input_ids)? + self.wpe.forward(&positions)?)?;

        for block in self.blocks.iter_mut() {
            hidden = block.forward(&hidden)?;
        }

        let hidden = self.ln_f.forward(&hidden)?;
        let last = hidden.i((.., seq_len - 1, ..))?;
        Ok(self.lm_head.forward(&last)?)
    }

    fn reset_cache(&mut self) {
        for block in &mut self.blocks {
            block.attn.clear_cache();
        }
    }

    fn eos_token_id(&self) -> u32 {
        self.config.eos_token_id
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn max_positions(&self) -> usize {
        self.config.n_positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> Gpt2Config {
        serde_json::from_str(
            r#"{"vocab_size": 40, "n_positions": 16, "n_embd": 8, "n_layer": 2, "n_head": 2}"#,
        )
        .unwrap()
    }

    fn tiny_model() -> Gpt2Model {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        Gpt2Model::new(tiny_config(), vb).unwrap()
    }

    fn ids(tokens: &[u32]) -> Tensor {
        Tensor::new(tokens, &Device::Cpu).unwrap().unsqueeze(0).unwrap()
    }

    #[test]
    fn config_defaults() {
        let config = tiny_config();
        assert_eq!(config.eos_token_id, 50256);
        assert_eq!(config.layer_norm_epsilon, 1e-5);
    }

    #[test]
    fn prefill_then_incremental_decode() {
        let mut model = tiny_model();

        let logits = model.forward(&ids(&[1, 2, 3]), 0).unwrap();
        assert_eq!(logits.dims(), &[1, 40]);

        let logits = model.forward(&ids(&[4]), 3).unwrap();
        assert_eq!(logits.dims(), &[1, 40]);

        let cached = model.blocks[0].attn.kv_cache.as_ref().unwrap();
        assert_eq!(cached.0.dims(), &[1, 2, 4, 4]);

        model.reset_cache();
        assert!(model.blocks.iter().all(|b| b.attn.kv_cache.is_none()));
    }

    #[test]
    fn rejects_sequences_past_position_table() {
        let mut model = tiny_model();
        let err = model.forward(&ids(&[1, 2]), 15).unwrap_err();
        assert!(matches!(err, ServiceError::Generation(_)));
    }

    #[test]
    fn rejects_indivisible_heads() {
        let mut config = tiny_config();
        config.n_head = 3;
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(Gpt2Model::new(config, vb).is_err());
    }

    #[test]
    fn causal_mask_blocks_future_keys() {
        let scores = Tensor::zeros((1, 1, 2, 3), DType::F32, &Device::Cpu).unwrap();
        let masked: Vec<Vec<f32>> = causal_mask(&scores)
            .unwrap()
            .squeeze(0)
            .unwrap()
            .squeeze(0)
            .unwrap()
            .to_vec2()
            .unwrap();
        assert_eq!(masked[0], vec![0.0, 0.0, f32::NEG_INFINITY]);
        assert_eq!(masked[1], vec![0.0, 0.0, 0.0]);
    }
}
