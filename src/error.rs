use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Concurrency limit must be at least 1, got {0}")]
    InvalidConcurrency(usize),
    #[error("Delay must be a finite, non-negative number of seconds, got {0}")]
    InvalidDelay(f64),
    #[error("Rate must be finite and non-negative, got {0}")]
    InvalidRate(f64),
    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,
    #[error("Invalid config value for {key}: {value}")]
    InvalidConfig { key: &'static str, value: String },
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Unexpected response structure: {0}")]
    MalformedResponse(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),
    #[error("Concurrency gate closed before a request could start.")]
    RuntimeGateClosed,

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<tokio::sync::AcquireError> for Error {
    fn from(_value: tokio::sync::AcquireError) -> Self {
        Error::RuntimeGateClosed
    }
}
