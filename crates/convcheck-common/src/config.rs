//! Process-level tester settings read from the environment.

use crate::{ConvCheckError, Result};
use std::env;
use std::sync::OnceLock;

/// Pins the random seed of every test procedure without an explicit seed.
pub const SEED_ENV: &str = "CONVCHECK_SEED";
/// Lower bound on the iteration count of every test procedure.
pub const MIN_ITERATIONS_ENV: &str = "CONVCHECK_MIN_ITERATIONS";

static TESTER_ENV: OnceLock<TesterEnv> = OnceLock::new();

/// Environment overrides for the tester
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TesterEnv {
    pub seed: Option<u64>,
    pub min_iterations: Option<usize>,
}

impl TesterEnv {
    /// Read the environment now, bypassing the process-wide cache.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            seed: parse_var(SEED_ENV)?,
            min_iterations: parse_var(MIN_ITERATIONS_ENV)?,
        })
    }

    /// Process-wide settings, read once on first use.
    ///
    /// Malformed values are logged and ignored here; use [`TesterEnv::from_env`]
    /// to surface them as errors.
    pub fn global() -> &'static TesterEnv {
        TESTER_ENV.get_or_init(|| {
            Self::from_env().unwrap_or_else(|e| {
                log::warn!("Ignoring convcheck environment overrides: {}", e);
                Self::default()
            })
        })
    }

    /// Apply the iteration floor to a configured iteration count.
    pub fn effective_iterations(&self, configured: usize) -> usize {
        match self.min_iterations {
            Some(min) => configured.max(min),
            None => configured,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConvCheckError::Config(format!("{key}={raw:?}: {e}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConvCheckError::Config(format!("{key}: {e}"))),
    }
}
