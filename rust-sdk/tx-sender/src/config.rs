use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_commitment_config::CommitmentLevel;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransactionError};

/// Compute unit limit used when a simulation reports no consumption
pub const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 200_000;

/// Largest compute unit limit a transaction may request
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

/// Default margin applied to simulated compute units
pub const DEFAULT_COMPUTE_UNIT_LIMIT_MULTIPLIER: f64 = 1.1;

/// Default age after which a cached blockhash lifetime is ignored
pub const DEFAULT_LIFETIME_MAX_AGE: Duration = Duration::from_millis(30_000);

/// Default commitment used when neither the request nor the config sets one
pub const DEFAULT_COMMITMENT: CommitmentLevel = CommitmentLevel::Confirmed;

/// Shared, live commitment setting.
///
/// The helper reads it at call time, so a cluster switch made through
/// [`CommitmentHandle::set`] applies to every later request.
#[derive(Debug, Clone)]
pub struct CommitmentHandle(Arc<RwLock<CommitmentLevel>>);

impl CommitmentHandle {
    pub fn new(commitment: CommitmentLevel) -> Self {
        Self(Arc::new(RwLock::new(commitment)))
    }

    pub fn get(&self) -> CommitmentLevel {
        match self.0.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, commitment: CommitmentLevel) {
        match self.0.write() {
            Ok(mut guard) => *guard = commitment,
            Err(poisoned) => *poisoned.into_inner() = commitment,
        }
    }
}

impl Default for CommitmentHandle {
    fn default() -> Self {
        Self::new(DEFAULT_COMMITMENT)
    }
}

/// Configuration for a [`crate::TransactionHelper`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperConfig {
    /// Commitment used when a request does not override it
    #[serde(default = "default_commitment")]
    pub commitment: CommitmentLevel,

    /// Margin applied to simulated compute units
    #[serde(default = "default_compute_unit_limit_multiplier")]
    pub compute_unit_limit_multiplier: f64,

    /// Age in milliseconds after which a cached lifetime is no longer used
    #[serde(default = "default_lifetime_max_age_ms")]
    pub lifetime_max_age_ms: u64,

    /// Default `maxRetries` forwarded to `sendTransaction`
    #[serde(default)]
    pub max_retries: Option<usize>,

    /// Default preflight behavior for `sendTransaction`
    #[serde(default)]
    pub skip_preflight: bool,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            commitment: default_commitment(),
            compute_unit_limit_multiplier: default_compute_unit_limit_multiplier(),
            lifetime_max_age_ms: default_lifetime_max_age_ms(),
            max_retries: None,
            skip_preflight: false,
        }
    }
}

impl HelperConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| TransactionError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.compute_unit_limit_multiplier.is_finite()
            || self.compute_unit_limit_multiplier <= 0.0
        {
            return Err(TransactionError::ConfigError(format!(
                "compute_unit_limit_multiplier must be a positive number, got {}",
                self.compute_unit_limit_multiplier
            )));
        }
        Ok(())
    }

    pub fn lifetime_max_age(&self) -> Duration {
        Duration::from_millis(self.lifetime_max_age_ms)
    }
}

fn default_commitment() -> CommitmentLevel {
    DEFAULT_COMMITMENT
}

fn default_compute_unit_limit_multiplier() -> f64 {
    DEFAULT_COMPUTE_UNIT_LIMIT_MULTIPLIER
}

fn default_lifetime_max_age_ms() -> u64 {
    DEFAULT_LIFETIME_MAX_AGE.as_millis() as u64
}

/// Options for signing and submitting a prepared transaction
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Preflight commitment; defaults to the prepared transaction's commitment
    pub commitment: Option<CommitmentLevel>,
    pub max_retries: Option<usize>,
    pub skip_preflight: Option<bool>,
    pub abort: Option<CancellationToken>,
}
