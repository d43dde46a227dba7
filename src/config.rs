use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Web chat front end for a small pretrained language model")]
pub struct Args {
    /// Hub model id, or a local directory holding config.json, tokenizer.json
    /// and model.safetensors
    #[arg(short, long, default_value = "distilgpt2")]
    pub model: String,

    #[arg(long, default_value = "main")]
    pub revision: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    #[arg(long)]
    pub cpu: bool,

    #[arg(long, env)]
    pub hf_token: Option<String>,

    /// Generate a single completion for this prompt and exit
    #[arg(short, long)]
    pub prompt: Option<String>,

    #[arg(long, default_value_t = 150)]
    pub max_length: usize,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f64,

    #[arg(long, default_value_t = 0.9)]
    pub top_p: f64,

    /// Always take the most likely token instead of sampling
    #[arg(long)]
    pub greedy: bool,

    /// 0 seeds the sampler from entropy
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Hide internal error text from API clients
    #[arg(long)]
    pub redact_errors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Prompt tokens beyond this are dropped by the encoder.
    pub max_prompt_tokens: usize,
    /// Cap on prompt plus continuation.
    pub max_length: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub do_sample: bool,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_prompt_tokens: 100,
            max_length: 150,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            do_sample: true,
            seed: None,
        }
    }
}

impl From<&Args> for GenerationConfig {
    fn from(args: &Args) -> Self {
        Self {
            max_length: args.max_length,
            temperature: args.temperature,
            top_p: args.top_p,
            do_sample: !args.greedy,
            seed: (args.seed != 0).then_some(args.seed),
            ..Self::default()
        }
    }
}
