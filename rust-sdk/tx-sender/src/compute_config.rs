use std::fmt;
use std::sync::Arc;

use solana_commitment_config::CommitmentLevel;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_COMPUTE_UNIT_LIMIT_MULTIPLIER;

/// Callback that receives the base64 wire encoding of a tuned message
pub type WireLogger = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for [`crate::prepare_transaction`]
#[derive(Clone)]
pub struct PrepareTransactionConfig {
    /// Margin applied to the simulated unit consumption
    pub compute_unit_limit_multiplier: f64,
    /// Re-estimate even when the message already sets a limit
    pub compute_unit_limit_reset: bool,
    /// Refresh the blockhash even when the message already has one
    pub blockhash_reset: bool,
    pub commitment: Option<CommitmentLevel>,
    pub log_wire: Option<WireLogger>,
    pub abort: Option<CancellationToken>,
}

impl Default for PrepareTransactionConfig {
    fn default() -> Self {
        Self {
            compute_unit_limit_multiplier: DEFAULT_COMPUTE_UNIT_LIMIT_MULTIPLIER,
            compute_unit_limit_reset: false,
            blockhash_reset: true,
            commitment: None,
            log_wire: None,
            abort: None,
        }
    }
}

impl fmt::Debug for PrepareTransactionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepareTransactionConfig")
            .field(
                "compute_unit_limit_multiplier",
                &self.compute_unit_limit_multiplier,
            )
            .field("compute_unit_limit_reset", &self.compute_unit_limit_reset)
            .field("blockhash_reset", &self.blockhash_reset)
            .field("commitment", &self.commitment)
            .field("log_wire", &self.log_wire.is_some())
            .field("abort", &self.abort)
            .finish()
    }
}

/// Compute tuning applied by `prepare_and_send` before signing
#[derive(Debug, Clone, Default)]
pub enum ComputeTuning {
    /// Tune with the helper's multiplier, keeping the prepared blockhash
    #[default]
    Enabled,
    Disabled,
    Custom(PrepareTransactionConfig),
}

impl ComputeTuning {
    pub(crate) fn resolve(self, multiplier: f64) -> Option<PrepareTransactionConfig> {
        match self {
            Self::Enabled => Some(PrepareTransactionConfig {
                compute_unit_limit_multiplier: multiplier,
                blockhash_reset: false,
                ..PrepareTransactionConfig::default()
            }),
            Self::Disabled => None,
            Self::Custom(config) => Some(config),
        }
    }
}
