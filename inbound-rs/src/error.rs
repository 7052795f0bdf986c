use thiserror::Error;

#[derive(Error, Debug)]
pub enum InboundError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("DNS lookup failed: {0}")]
    DnsLookup(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Authentication evaluator error: {0}")]
    Authentication(String),

    #[error("Connection counter error: {0}")]
    Counter(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

pub type Result<T> = std::result::Result<T, InboundError>;
