use candle_core::{DType, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{Result, ServiceError};

/// Temperature, top-k and nucleus (top-p) sampling over the last-position
/// logits. A temperature of zero means greedy decoding.
pub struct Sampler {
    temperature: f64,
    top_p: f64,
    top_k: usize,
    rng: StdRng,
}

impl Sampler {
    pub fn new(temperature: f64, top_p: f64, top_k: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            temperature,
            top_p,
            top_k,
            rng,
        }
    }

    pub fn greedy() -> Self {
        Self::new(0.0, 1.0, 0, Some(0))
    }

    pub fn sample(&mut self, logits: &Tensor) -> Result<u32> {
        let logits = last_position(logits)?.to_dtype(DType::F32)?;
        let logits: Vec<f32> = logits.to_vec1()?;
        if logits.is_empty() {
            return Err(ServiceError::Generation("empty logits".to_string()));
        }

        if self.temperature <= 0.0 {
            return Ok(argmax(&logits));
        }

        let temperature = self.temperature as f32;
        let mut indexed: Vec<(usize, f32)> = logits
            .iter()
            .map(|l| l / temperature)
            .enumerate()
            .collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        if self.top_k > 0 && self.top_k < indexed.len() {
            indexed.truncate(self.top_k);
        }

        let max_logit = indexed[0].1;
        let mut probs: Vec<(usize, f32)> = indexed
            .iter()
            .map(|(i, l)| (*i, (l - max_logit).exp()))
            .collect();
        normalize(&mut probs);

        if self.top_p < 1.0 {
            let top_p = self.top_p as f32;
            let mut cumsum = 0.0f32;
            let cutoff = probs
                .iter()
                .position(|(_, p)| {
                    cumsum += p;
                    cumsum > top_p
                })
                .map(|idx| idx + 1)
                .unwrap_or(probs.len());
            probs.truncate(cutoff.max(1));
            normalize(&mut probs);
        }

        let r: f32 = self.rng.gen();
        let mut cumsum = 0.0;
        for (idx, prob) in probs.iter() {
            cumsum += prob;
            if r < cumsum {
                return Ok(*idx as u32);
            }
        }

        Ok(probs.last().map(|(i, _)| *i as u32).unwrap_or(0))
    }
}

fn normalize(probs: &mut [(usize, f32)]) {
    let sum: f32 = probs.iter().map(|(_, p)| p).sum();
    for (_, p) in probs.iter_mut() {
        *p /= sum;
    }
}

fn argmax(logits: &[f32]) -> u32 {
    logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx as u32)
        .unwrap_or(0)
}

/// Reduces `[vocab]`, `[seq, vocab]` or `[batch, seq, vocab]` logits to the
/// final position's `[vocab]` row.
pub fn last_position(logits: &Tensor) -> Result<Tensor> {
    let dims = logits.dims();
    let row = match dims.len() {
        1 => logits.clone(),
        2 => logits.get(dims[0] - 1)?,
        3 => logits.get(0)?.get(dims[1] - 1)?,
        _ => {
            return Err(ServiceError::Generation(format!(
                "unexpected logits shape {:?}",
                dims
            )));
        }
    };
    Ok(row)
}
