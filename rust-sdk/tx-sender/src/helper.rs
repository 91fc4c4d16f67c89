use std::sync::Arc;

use solana_commitment_config::CommitmentLevel;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solana_transaction_status_client_types::UiTransactionEncoding;
use tracing::{debug, info};

use crate::abort::abortable;
use crate::compute_budget::prepare_transaction;
use crate::compute_config::{ComputeTuning, PrepareTransactionConfig};
use crate::config::{CommitmentHandle, HelperConfig, SendOptions};
use crate::error::Result;
use crate::message::{encode_wire_transaction, TransactionMessage};
use crate::prepare::{prepare_transaction_request, PrepareRequest, PreparedTransaction};
use crate::send::{
    sign_and_send_transaction_message_with_signers, sign_transaction_message_with_signers,
};
use crate::signer::SignerMode;

/// Options for [`TransactionHelper::prepare_and_send`]
#[derive(Debug, Clone, Default)]
pub struct PrepareAndSendOptions {
    pub send: SendOptions,
    pub compute_tuning: ComputeTuning,
}

/// Prepares, signs and submits transactions against one RPC endpoint.
///
/// The helper is cheap to clone; clones share the RPC client and the commitment
/// handle.
#[derive(Clone)]
pub struct TransactionHelper {
    rpc: Arc<RpcClient>,
    config: HelperConfig,
    commitment: CommitmentHandle,
}

impl TransactionHelper {
    pub fn new(rpc: Arc<RpcClient>, config: HelperConfig) -> Self {
        let commitment = CommitmentHandle::new(config.commitment);
        Self::with_commitment_handle(rpc, config, commitment)
    }

    /// Uses a commitment handle shared with other components.
    pub fn with_commitment_handle(
        rpc: Arc<RpcClient>,
        config: HelperConfig,
        commitment: CommitmentHandle,
    ) -> Self {
        Self {
            rpc,
            config,
            commitment,
        }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn config(&self) -> &HelperConfig {
        &self.config
    }

    pub fn commitment_handle(&self) -> &CommitmentHandle {
        &self.commitment
    }

    /// Commitment currently in effect for requests that do not set one.
    pub fn commitment(&self) -> CommitmentLevel {
        self.commitment.get()
    }

    pub async fn prepare(&self, request: PrepareRequest) -> Result<PreparedTransaction> {
        prepare_transaction_request(&self.rpc, self.commitment(), request).await
    }

    /// Runs compute tuning against this helper's RPC client. Without an explicit
    /// commitment in `config`, the helper's live commitment is used.
    pub async fn prepare_transaction(
        &self,
        message: TransactionMessage,
        config: &PrepareTransactionConfig,
    ) -> Result<TransactionMessage> {
        if config.commitment.is_some() {
            return prepare_transaction(&self.rpc, message, config).await;
        }
        let config = PrepareTransactionConfig {
            commitment: Some(self.commitment()),
            ..config.clone()
        };
        prepare_transaction(&self.rpc, message, &config).await
    }

    /// Signs with every attached signer. Fails if any required signature is missing.
    pub async fn sign(
        &self,
        prepared: &PreparedTransaction,
        options: &SendOptions,
    ) -> Result<VersionedTransaction> {
        sign_transaction_message_with_signers(prepared.message(), options.abort.as_ref()).await
    }

    /// Base64 wire encoding of the fully signed transaction.
    pub async fn to_wire(
        &self,
        prepared: &PreparedTransaction,
        options: &SendOptions,
    ) -> Result<String> {
        encode_wire_transaction(&self.sign(prepared, options).await?)
    }

    pub async fn send(
        &self,
        prepared: &PreparedTransaction,
        options: &SendOptions,
    ) -> Result<Signature> {
        let abort = options.abort.as_ref();
        let signature = match prepared.mode() {
            SignerMode::Send => {
                debug!(fee_payer = %prepared.fee_payer(), "submitting through the wallet");
                sign_and_send_transaction_message_with_signers(prepared.message(), abort).await?
            }
            SignerMode::Partial => {
                let transaction =
                    sign_transaction_message_with_signers(prepared.message(), abort).await?;
                let config = RpcSendTransactionConfig {
                    skip_preflight: options.skip_preflight.unwrap_or(self.config.skip_preflight),
                    preflight_commitment: Some(
                        options.commitment.unwrap_or(prepared.commitment()),
                    ),
                    encoding: Some(UiTransactionEncoding::Base64),
                    max_retries: options.max_retries.or(self.config.max_retries),
                    ..RpcSendTransactionConfig::default()
                };
                abortable(
                    abort,
                    self.rpc.send_transaction_with_config(&transaction, config),
                )
                .await?
            }
        };
        info!(%signature, "transaction submitted");
        Ok(signature)
    }

    /// Prepares, optionally tunes compute units, then signs and submits.
    pub async fn prepare_and_send(
        &self,
        request: PrepareRequest,
        options: PrepareAndSendOptions,
    ) -> Result<Signature> {
        let prepared = self.prepare(request).await?;
        let prepared = match options
            .compute_tuning
            .resolve(self.config.compute_unit_limit_multiplier)
        {
            Some(mut config) => {
                config.commitment = config.commitment.or(Some(prepared.commitment()));
                if config.abort.is_none() {
                    config.abort = options.send.abort.clone();
                }
                let message = self
                    .prepare_transaction(prepared.message().clone(), &config)
                    .await?;
                prepared.with_message(message)?
            }
            None => prepared,
        };
        self.send(&prepared, &options.send).await
    }
}
