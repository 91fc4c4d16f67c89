use std::sync::Arc;

use solana_pubkey::Pubkey;
use solana_rpc_client_api::client_error::Error as ClientError;
use solana_transaction_error::TransactionError as LedgerTransactionError;
use solana_tx_kit_core::AmountError;

/// Errors that can occur during transaction preparation, signing and sending
///
/// The enum is `Clone` so that the instruction pool can record a failure in its
/// async state and still hand the same error back to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransactionError {
    #[error("RPC Error: {0}")]
    RpcError(Arc<ClientError>),

    #[error("Signing Error: {0}")]
    SigningError(String),

    #[error("Missing signatures for: {}", format_addresses(.0))]
    MissingSignatures(Vec<Pubkey>),

    #[error("Capability Error: {0}")]
    CapabilityError(String),

    #[error("Wallet Error: {0}")]
    WalletError(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("Amount Error: {0}")]
    AmountError(#[from] AmountError),

    #[error("Compile Error: {0}")]
    CompileError(String),

    #[error("Serialization Error: {0}")]
    SerializationError(String),

    #[error("Invalid Configuration: {0}")]
    ConfigError(String),

    #[error("Operation aborted")]
    Aborted,
}

impl From<ClientError> for TransactionError {
    fn from(error: ClientError) -> Self {
        Self::RpcError(Arc::new(error))
    }
}

impl From<bincode::Error> for TransactionError {
    fn from(error: bincode::Error) -> Self {
        Self::SerializationError(error.to_string())
    }
}

impl TransactionError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Whether the ledger rejected the transaction because an identical one was
    /// already processed.
    pub fn is_already_processed(&self) -> bool {
        let Self::RpcError(error) = self else {
            return false;
        };
        if matches!(
            error.get_transaction_error(),
            Some(LedgerTransactionError::AlreadyProcessed)
        ) {
            return true;
        }
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("already been processed")
    }
}

fn format_addresses(addresses: &[Pubkey]) -> String {
    addresses
        .iter()
        .map(Pubkey::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for transaction operations
pub type Result<T> = std::result::Result<T, TransactionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use solana_rpc_client_api::client_error::ErrorKind as ClientErrorKind;

    #[test]
    fn test_already_processed_from_transaction_error() {
        let error: TransactionError =
            ClientError::from(ClientErrorKind::TransactionError(
                LedgerTransactionError::AlreadyProcessed,
            ))
            .into();
        assert!(error.is_already_processed());
    }

    #[test]
    fn test_already_processed_from_message() {
        let error: TransactionError = ClientError::from(ClientErrorKind::Custom(
            "Transaction simulation failed: This transaction has already been processed"
                .to_string(),
        ))
        .into();
        assert!(error.is_already_processed());
    }

    #[test]
    fn test_other_errors_are_not_already_processed() {
        let error: TransactionError = ClientError::from(ClientErrorKind::TransactionError(
            LedgerTransactionError::BlockhashNotFound,
        ))
        .into();
        assert!(!error.is_already_processed());
        assert!(!TransactionError::Aborted.is_already_processed());
    }

    #[test]
    fn test_missing_signatures_message() {
        let address = Pubkey::new_unique();
        let error = TransactionError::MissingSignatures(vec![address]);
        assert_eq!(
            error.to_string(),
            format!("Missing signatures for: {address}")
        );
    }
}
