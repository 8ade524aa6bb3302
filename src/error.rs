use thiserror::Error;

/// Reasons a raw node payload is rejected before it reaches fusion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Invalid module id: {0}")]
    InvalidModuleId(i64),

    #[error("Invalid distance: {0}")]
    InvalidDistance(f64),

    #[error("Unknown posture: {0}")]
    UnknownPosture(String),

    #[error("Posture field too long ({0} bytes)")]
    PostureTooLong(usize),
}

/// Configuration load and validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum MasterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Status server error: {0}")]
    Status(#[from] std::io::Error),

    #[error("Alert delivery failed: {0}")]
    Delivery(String),
}

pub type MasterResult<T> = Result<T, MasterError>;
