use std::path::PathBuf;

/// Minimum number of cleaned letters before statistical key recovery is attempted.
pub const MIN_CRYPTANALYSIS_LETTERS: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum CrackError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ciphertext too short for cryptanalysis: {letters} letters, need at least {required}")]
    InsufficientData { letters: usize, required: usize },

    #[error("Worker failure: {0}")]
    WorkerFailure(String),

    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl CrackError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CrackError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CrackError>;
