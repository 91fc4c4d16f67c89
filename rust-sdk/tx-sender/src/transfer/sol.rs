use solana_commitment_config::CommitmentLevel;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_system_interface::instruction::transfer;
use solana_tx_kit_core::{lamports_from_sol, DecimalInput};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SendOptions;
use crate::error::Result;
use crate::helper::TransactionHelper;
use crate::message::BlockhashLifetime;
use crate::prepare::{FeePayer, PrepareRequest, PreparedTransaction};
use crate::signer::SignerSource;

/// A native SOL transfer from `authority` to `destination`.
#[derive(Debug, Clone)]
pub struct SolTransferRequest {
    pub authority: SignerSource,
    pub destination: Pubkey,
    pub lamports: u64,
    pub fee_payer: Option<FeePayer>,
    pub commitment: Option<CommitmentLevel>,
    pub lifetime: Option<BlockhashLifetime>,
    pub compute_unit_limit: Option<u32>,
    pub compute_unit_price: Option<u64>,
    pub abort: Option<CancellationToken>,
}

impl SolTransferRequest {
    pub fn new(authority: impl Into<SignerSource>, destination: Pubkey, lamports: u64) -> Self {
        Self {
            authority: authority.into(),
            destination,
            lamports,
            fee_payer: None,
            commitment: None,
            lifetime: None,
            compute_unit_limit: None,
            compute_unit_price: None,
            abort: None,
        }
    }

    /// Builds a request from a decimal SOL amount such as `"0.25"`.
    pub fn from_sol<'a>(
        authority: impl Into<SignerSource>,
        destination: Pubkey,
        sol: impl Into<DecimalInput<'a>>,
    ) -> Result<Self> {
        Ok(Self::new(authority, destination, lamports_from_sol(sol)?))
    }
}

/// Prepares and sends system-program transfers.
#[derive(Clone)]
pub struct SolTransferHelper {
    helper: TransactionHelper,
}

impl SolTransferHelper {
    pub fn new(helper: TransactionHelper) -> Self {
        Self { helper }
    }

    pub async fn prepare_transfer(
        &self,
        request: SolTransferRequest,
    ) -> Result<PreparedTransaction> {
        let source = request.authority.address();
        debug!(
            %source,
            destination = %request.destination,
            lamports = request.lamports,
            "preparing SOL transfer"
        );
        let instruction = transfer(&source, &request.destination, request.lamports);
        self.helper
            .prepare(PrepareRequest {
                instructions: vec![instruction],
                authority: Some(request.authority),
                fee_payer: request.fee_payer,
                commitment: request.commitment,
                compute_unit_limit: request.compute_unit_limit,
                compute_unit_price: request.compute_unit_price,
                lifetime: request.lifetime,
                abort: request.abort,
                ..PrepareRequest::default()
            })
            .await
    }

    pub async fn send_prepared_transfer(
        &self,
        prepared: &PreparedTransaction,
        options: &SendOptions,
    ) -> Result<Signature> {
        self.helper.send(prepared, options).await
    }

    pub async fn send_transfer(
        &self,
        request: SolTransferRequest,
        options: &SendOptions,
    ) -> Result<Signature> {
        let prepared = self.prepare_transfer(request).await?;
        self.send_prepared_transfer(&prepared, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{mock_lifetime, MockRpc};
    use crate::TransactionError;
    use solana_keypair::Keypair;
    use solana_sdk_ids::system_program;
    use solana_signer::Signer;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_prepare_transfer_builds_system_instruction() {
        let rpc = MockRpc::new();
        let transfers = SolTransferHelper::new(rpc.helper());
        let authority = Arc::new(Keypair::new());
        let destination = Pubkey::new_unique();

        let prepared = transfers
            .prepare_transfer(SolTransferRequest::new(
                authority.clone(),
                destination,
                1_500,
            ))
            .await
            .unwrap();

        assert_eq!(prepared.instructions().len(), 1);
        let instruction = &prepared.instructions()[0];
        assert_eq!(instruction.program_id, system_program::ID);
        assert_eq!(instruction.accounts[0].pubkey, authority.pubkey());
        assert_eq!(instruction.accounts[1].pubkey, destination);
        assert_eq!(prepared.fee_payer(), authority.pubkey());
    }

    #[tokio::test]
    async fn test_send_transfer_submits_signed_transaction() {
        let rpc = MockRpc::new();
        let transfers = SolTransferHelper::new(rpc.helper());
        let authority = Arc::new(Keypair::new());
        let request = SolTransferRequest {
            lifetime: Some(mock_lifetime(200)),
            ..SolTransferRequest::from_sol(authority.clone(), Pubkey::new_unique(), "1.5").unwrap()
        };
        assert_eq!(request.lamports, 1_500_000_000);

        let prepared = transfers.prepare_transfer(request).await.unwrap();
        assert_eq!(prepared.mode(), crate::SignerMode::Partial);
        let signature = transfers
            .send_prepared_transfer(&prepared, &SendOptions::default())
            .await
            .unwrap();

        assert_eq!(rpc.sent()[0].signatures[0], signature);
        assert_eq!(rpc.count("sendTransaction"), 1);
        assert_eq!(rpc.count("getLatestBlockhash"), 0);
    }

    #[tokio::test]
    async fn test_already_processed_is_not_retried() {
        let rpc = MockRpc::new();
        rpc.fail_next_send(
            solana_rpc_client_api::client_error::ErrorKind::TransactionError(
                solana_transaction_error::TransactionError::AlreadyProcessed,
            ),
        );
        let transfers = SolTransferHelper::new(rpc.helper());
        let authority = Arc::new(Keypair::new());

        let error = transfers
            .send_transfer(
                SolTransferRequest::new(authority, Pubkey::new_unique(), 1),
                &SendOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(error.is_already_processed());
        assert_eq!(rpc.count("sendTransaction"), 1);
        assert!(matches!(error, TransactionError::RpcError(_)));
    }

    #[test]
    fn test_from_sol_rejects_negative_amounts() {
        let result =
            SolTransferRequest::from_sol(Arc::new(Keypair::new()), Pubkey::new_unique(), "-1");
        assert!(matches!(result, Err(TransactionError::AmountError(_))));
    }
}
