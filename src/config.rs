//! Search configuration.
//!
//! Defaults cover the common case; a JSON file can override any field and
//! CLI flags override the file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CrackError, Result};

pub const MAX_KEY_LENGTH_LIMIT : usize = 64;
pub const MAX_ITERATIONS_LIMIT : usize = 100_000;

/// Workers never drop below this, however small the machine.
pub const MIN_WORKERS : usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrackConfig {
    /// Longest key length considered by the key length estimate
    pub max_key_length : usize,

    /// Word recognition percentage at which the search is satisfied
    pub target_recognition : f64,

    /// Upper bound on hill-climbing iterations per refinement
    pub max_iterations : usize,

    /// Worker pool size (None = derived from available parallelism)
    pub workers : Option<usize>,
}

impl Default for CrackConfig {
    fn default() -> Self {
        Self {
            max_key_length: 12,
            target_recognition: 80.0,
            max_iterations: 500,
            workers: None,
        }
    }
}

impl CrackConfig {
    pub fn load<P: AsRef<Path>>(path : P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|source| CrackError::Io { path: path.to_path_buf(), source })?;

        let config : CrackConfig = serde_json::from_str(&text)
            .map_err(|e| CrackError::Config(format!("{:?}: {}", path, e)))?;

        config.validate()?;
        tracing::debug!("Loaded config from {:?}: {:?}", path, config);

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_search_params(self.max_key_length, self.target_recognition, self.max_iterations)?;

        if self.workers == Some(0) {
            return Err(CrackError::invalid("workers must be at least 1"));
        }

        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count)
    }
}

pub fn validate_search_params(max_key_length : usize, target_recognition : f64, max_iterations : usize) -> Result<()> {
    if max_key_length == 0 || max_key_length > MAX_KEY_LENGTH_LIMIT {
        return Err(CrackError::invalid(format!(
            "max_key_length must be between 1 and {}, got {}", MAX_KEY_LENGTH_LIMIT, max_key_length)));
    }

    if !(0.0..=100.0).contains(&target_recognition) {
        return Err(CrackError::invalid(format!(
            "target_recognition must be between 0 and 100, got {}", target_recognition)));
    }

    if max_iterations == 0 || max_iterations > MAX_ITERATIONS_LIMIT {
        return Err(CrackError::invalid(format!(
            "max_iterations must be between 1 and {}, got {}", MAX_ITERATIONS_LIMIT, max_iterations)));
    }

    Ok(())
}

/// One fewer than the available cores, floored at `MIN_WORKERS`.
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(MIN_WORKERS);

    std::cmp::max(cores.saturating_sub(1), MIN_WORKERS)
}
