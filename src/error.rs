use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Hub error: {0}")]
    Hub(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
