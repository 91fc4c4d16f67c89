use solana_account_decoder::{UiAccountEncoding, UiDataSliceConfig};
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_instruction::Instruction;
use solana_pubkey::Pubkey;
use solana_rpc_client_api::config::RpcAccountInfoConfig;
use solana_signature::Signature;
use solana_tx_kit_core::{AmountError, FormatOptions, Rounding, TokenMath};
use spl_associated_token_account_client::address::get_associated_token_address_with_program_id;
use spl_associated_token_account_client::instruction::create_associated_token_account_idempotent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::abort::abortable;
use crate::config::SendOptions;
use crate::error::{Result, TransactionError};
use crate::helper::TransactionHelper;
use crate::message::BlockhashLifetime;
use crate::prepare::{FeePayer, PrepareRequest, PreparedTransaction};
use crate::signer::SignerSource;

/// Mint the helper transfers, and the token program that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplTokenConfig {
    pub mint: Pubkey,
    pub decimals: u8,
    pub token_program: Pubkey,
    pub commitment: Option<CommitmentLevel>,
}

impl SplTokenConfig {
    /// A mint owned by the classic token program.
    pub fn new(mint: Pubkey, decimals: u8) -> Self {
        Self {
            mint,
            decimals,
            token_program: spl_token::id(),
            commitment: None,
        }
    }

    pub fn with_token_program(mut self, token_program: Pubkey) -> Self {
        self.token_program = token_program;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplTokenBalance {
    pub associated_token_address: Pubkey,
    /// Base units
    pub amount: u128,
    pub ui_amount: String,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAmount {
    BaseUnits(u128),
    /// Decimal token amount such as `"12.5"`, truncated to the mint's precision
    Decimal(String),
}

#[derive(Debug, Clone)]
pub struct SplTransferRequest {
    pub authority: SignerSource,
    pub destination_owner: Pubkey,
    pub amount: TransferAmount,
    /// Owner of the source token account; defaults to the authority
    pub source_owner: Option<Pubkey>,
    /// Create the destination token account when it does not exist
    pub ensure_destination_ata: bool,
    pub fee_payer: Option<FeePayer>,
    pub commitment: Option<CommitmentLevel>,
    pub lifetime: Option<BlockhashLifetime>,
    pub compute_unit_limit: Option<u32>,
    pub compute_unit_price: Option<u64>,
    pub abort: Option<CancellationToken>,
}

impl SplTransferRequest {
    pub fn new(
        authority: impl Into<SignerSource>,
        destination_owner: Pubkey,
        amount: TransferAmount,
    ) -> Self {
        Self {
            authority: authority.into(),
            destination_owner,
            amount,
            source_owner: None,
            ensure_destination_ata: true,
            fee_payer: None,
            commitment: None,
            lifetime: None,
            compute_unit_limit: None,
            compute_unit_price: None,
            abort: None,
        }
    }
}

/// Balance lookups and `transfer_checked` transfers for a single mint.
#[derive(Clone)]
pub struct SplTokenHelper {
    helper: TransactionHelper,
    config: SplTokenConfig,
    math: TokenMath,
}

impl SplTokenHelper {
    pub fn new(helper: TransactionHelper, config: SplTokenConfig) -> Result<Self> {
        let math = TokenMath::new(config.decimals)?;
        Ok(Self {
            helper,
            config,
            math,
        })
    }

    pub fn config(&self) -> &SplTokenConfig {
        &self.config
    }

    pub fn math(&self) -> &TokenMath {
        &self.math
    }

    pub fn associated_token_address(&self, owner: &Pubkey) -> Pubkey {
        get_associated_token_address_with_program_id(
            owner,
            &self.config.mint,
            &self.config.token_program,
        )
    }

    fn commitment(&self, requested: Option<CommitmentLevel>) -> CommitmentLevel {
        requested
            .or(self.config.commitment)
            .unwrap_or_else(|| self.helper.commitment())
    }

    async fn account_exists(
        &self,
        address: &Pubkey,
        commitment: CommitmentLevel,
        abort: Option<&CancellationToken>,
    ) -> Result<bool> {
        // Only existence matters, so no account data is requested.
        let config = RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            data_slice: Some(UiDataSliceConfig {
                offset: 0,
                length: 0,
            }),
            commitment: Some(CommitmentConfig { commitment }),
            ..RpcAccountInfoConfig::default()
        };
        let response = abortable(
            abort,
            self.helper.rpc().get_account_with_config(address, config),
        )
        .await?;
        Ok(response.value.is_some())
    }

    /// Balance of `owner`'s associated token account. A missing account reads as
    /// zero with `exists == false`.
    pub async fn fetch_balance(
        &self,
        owner: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> Result<SplTokenBalance> {
        let commitment = self.commitment(commitment);
        let associated_token_address = self.associated_token_address(owner);
        if !self
            .account_exists(&associated_token_address, commitment, None)
            .await?
        {
            return Ok(SplTokenBalance {
                associated_token_address,
                amount: 0,
                ui_amount: self.math.to_decimal_string(0, FormatOptions::default()),
                exists: false,
            });
        }

        let balance = self
            .helper
            .rpc()
            .get_token_account_balance_with_commitment(
                &associated_token_address,
                CommitmentConfig { commitment },
            )
            .await?
            .value;
        let amount = self
            .math
            .parse_base_units(&balance.amount, "token account balance")?;
        Ok(SplTokenBalance {
            associated_token_address,
            amount,
            ui_amount: self.math.to_decimal_string(amount, FormatOptions::default()),
            exists: true,
        })
    }

    fn resolve_amount(&self, amount: &TransferAmount) -> Result<u64> {
        let base_units = match amount {
            TransferAmount::BaseUnits(amount) => *amount,
            TransferAmount::Decimal(value) => {
                self.math
                    .from_decimal(value, Rounding::Floor, "transfer amount")?
            }
        };
        u64::try_from(base_units).map_err(|_| {
            TransactionError::from(AmountError::OutOfRange {
                label: "transfer amount".to_string(),
            })
        })
    }

    fn transfer_checked_instruction(
        &self,
        source: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> Result<Instruction> {
        let mut instruction = spl_token::instruction::transfer_checked(
            &spl_token::id(),
            source,
            &self.config.mint,
            destination,
            authority,
            &[],
            amount,
            self.config.decimals,
        )
        .map_err(|e| TransactionError::validation(e.to_string()))?;
        // Token-2022 shares the transfer_checked layout.
        instruction.program_id = self.config.token_program;
        Ok(instruction)
    }

    pub async fn prepare_transfer(
        &self,
        request: SplTransferRequest,
    ) -> Result<PreparedTransaction> {
        let authority = request.authority.address();
        let source_owner = request.source_owner.unwrap_or(authority);
        let source = self.associated_token_address(&source_owner);
        let destination = self.associated_token_address(&request.destination_owner);
        let amount = self.resolve_amount(&request.amount)?;
        let commitment = self.commitment(request.commitment);

        let mut instructions = Vec::with_capacity(2);
        if request.ensure_destination_ata
            && !self
                .account_exists(&destination, commitment, request.abort.as_ref())
                .await?
        {
            let payer = request
                .fee_payer
                .as_ref()
                .map_or(authority, FeePayer::address);
            debug!(
                %destination,
                owner = %request.destination_owner,
                "creating destination token account"
            );
            instructions.push(create_associated_token_account_idempotent(
                &payer,
                &request.destination_owner,
                &self.config.mint,
                &self.config.token_program,
            ));
        }
        instructions.push(self.transfer_checked_instruction(
            &source,
            &destination,
            &authority,
            amount,
        )?);

        self.helper
            .prepare(PrepareRequest {
                instructions,
                authority: Some(request.authority),
                fee_payer: request.fee_payer,
                commitment: Some(commitment),
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

    /// Prepares and sends a transfer.
    ///
    /// When the cluster reports that the transaction was already processed the
    /// transfer is rebuilt once with a fresh blockhash and sent again. Any other
    /// failure, or a second failure, is returned as-is.
    pub async fn send_transfer(
        &self,
        request: SplTransferRequest,
        options: &SendOptions,
    ) -> Result<Signature> {
        let prepared = self.prepare_transfer(request.clone()).await?;
        match self.send_prepared_transfer(&prepared, options).await {
            Err(error) if error.is_already_processed() => {
                warn!(%error, "transfer already processed, retrying with a fresh blockhash");
                let retry = SplTransferRequest {
                    lifetime: None,
                    ..request
                };
                let prepared = self.prepare_transfer(retry).await?;
                self.send_prepared_transfer(&prepared, options).await
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{mock_lifetime, MockRpc};
    use rstest::rstest;
    use solana_keypair::Keypair;
    use solana_rpc_client_api::client_error::ErrorKind as ClientErrorKind;
    use solana_signer::Signer;
    use solana_transaction_error::TransactionError as LedgerTransactionError;
    use std::sync::Arc;

    const TOKEN_2022: Pubkey =
        solana_pubkey::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

    fn token_helper(rpc: &MockRpc) -> SplTokenHelper {
        SplTokenHelper::new(rpc.helper(), SplTokenConfig::new(Pubkey::new_unique(), 6)).unwrap()
    }

    fn already_processed() -> ClientErrorKind {
        ClientErrorKind::TransactionError(LedgerTransactionError::AlreadyProcessed)
    }

    #[test]
    fn test_rejects_invalid_decimals() {
        let rpc = MockRpc::new();
        let result =
            SplTokenHelper::new(rpc.helper(), SplTokenConfig::new(Pubkey::new_unique(), 39));
        assert!(matches!(result, Err(TransactionError::AmountError(_))));
    }

    #[test]
    fn test_associated_token_address_uses_token_program() {
        let rpc = MockRpc::new();
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let classic = SplTokenHelper::new(rpc.helper(), SplTokenConfig::new(mint, 6)).unwrap();
        let extended = SplTokenHelper::new(
            rpc.helper(),
            SplTokenConfig::new(mint, 6).with_token_program(TOKEN_2022),
        )
        .unwrap();
        assert_ne!(
            classic.associated_token_address(&owner),
            extended.associated_token_address(&owner)
        );
    }

    #[rstest]
    #[case(TransferAmount::BaseUnits(1_500), 1_500)]
    #[case(TransferAmount::Decimal("1.5".to_string()), 1_500_000)]
    #[case(TransferAmount::Decimal("0.0000019".to_string()), 1)]
    fn test_resolve_amount(#[case] amount: TransferAmount, #[case] expected: u64) {
        let rpc = MockRpc::new();
        assert_eq!(token_helper(&rpc).resolve_amount(&amount).unwrap(), expected);
    }

    #[test]
    fn test_resolve_amount_rejects_overflow() {
        let rpc = MockRpc::new();
        let amount = TransferAmount::BaseUnits(u128::from(u64::MAX) + 1);
        assert!(matches!(
            token_helper(&rpc).resolve_amount(&amount),
            Err(TransactionError::AmountError(AmountError::OutOfRange { .. }))
        ));
    }

    #[tokio::test]
    async fn test_fetch_balance_of_missing_account() {
        let rpc = MockRpc::new();
        let tokens = token_helper(&rpc);
        let owner = Pubkey::new_unique();

        let balance = tokens.fetch_balance(&owner, None).await.unwrap();

        assert!(!balance.exists);
        assert_eq!(balance.amount, 0);
        assert_eq!(balance.ui_amount, "0");
        assert_eq!(balance.associated_token_address, tokens.associated_token_address(&owner));
        assert_eq!(rpc.count("getTokenAccountBalance"), 0);
    }

    #[tokio::test]
    async fn test_fetch_balance_of_existing_account() {
        let rpc = MockRpc::new();
        let tokens = token_helper(&rpc);
        let owner = Pubkey::new_unique();
        rpc.set_token_balance(tokens.associated_token_address(&owner), 1_250_000, 6);

        let balance = tokens.fetch_balance(&owner, None).await.unwrap();

        assert!(balance.exists);
        assert_eq!(balance.amount, 1_250_000);
        assert_eq!(balance.ui_amount, "1.25");
    }

    #[tokio::test]
    async fn test_prepare_creates_missing_destination_account() {
        let rpc = MockRpc::new();
        let tokens = token_helper(&rpc);
        let authority = Arc::new(Keypair::new());
        let destination_owner = Pubkey::new_unique();
        let request = SplTransferRequest {
            lifetime: Some(mock_lifetime(200)),
            ..SplTransferRequest::new(
                authority.clone(),
                destination_owner,
                TransferAmount::BaseUnits(10),
            )
        };

        let prepared = tokens.prepare_transfer(request).await.unwrap();

        let instructions = prepared.instructions();
        assert_eq!(instructions.len(), 2);
        assert_eq!(
            instructions[0].program_id,
            spl_associated_token_account_client::program::id()
        );
        assert_eq!(instructions[1].program_id, spl_token::id());
        assert_eq!(
            instructions[1].accounts[2].pubkey,
            tokens.associated_token_address(&destination_owner)
        );
        assert_eq!(instructions[1].accounts[3].pubkey, authority.pubkey());
    }

    #[tokio::test]
    async fn test_prepare_skips_existing_destination_account() {
        let rpc = MockRpc::new();
        let tokens = token_helper(&rpc);
        let destination_owner = Pubkey::new_unique();
        rpc.add_account(tokens.associated_token_address(&destination_owner));
        let request = SplTransferRequest {
            lifetime: Some(mock_lifetime(200)),
            ..SplTransferRequest::new(
                Arc::new(Keypair::new()),
                destination_owner,
                TransferAmount::BaseUnits(10),
            )
        };

        let prepared = tokens.prepare_transfer(request).await.unwrap();

        assert_eq!(prepared.instructions().len(), 1);
        let config = &rpc.calls();
        assert_eq!(config, &vec!["getAccountInfo".to_string()]);
    }

    #[tokio::test]
    async fn test_token_2022_program_is_used_for_transfer() {
        let rpc = MockRpc::new();
        let tokens = SplTokenHelper::new(
            rpc.helper(),
            SplTokenConfig::new(Pubkey::new_unique(), 6).with_token_program(TOKEN_2022),
        )
        .unwrap();
        let request = SplTransferRequest {
            ensure_destination_ata: false,
            lifetime: Some(mock_lifetime(200)),
            ..SplTransferRequest::new(
                Arc::new(Keypair::new()),
                Pubkey::new_unique(),
                TransferAmount::BaseUnits(10),
            )
        };

        let prepared = tokens.prepare_transfer(request).await.unwrap();

        assert_eq!(prepared.instructions().len(), 1);
        assert_eq!(prepared.instructions()[0].program_id, TOKEN_2022);
    }

    #[tokio::test]
    async fn test_send_transfer_retries_once_when_already_processed() {
        let rpc = MockRpc::new();
        rpc.fail_next_send(already_processed());
        let tokens = token_helper(&rpc);
        let request = SplTransferRequest {
            ensure_destination_ata: false,
            lifetime: Some(mock_lifetime(200)),
            ..SplTransferRequest::new(
                Arc::new(Keypair::new()),
                Pubkey::new_unique(),
                TransferAmount::BaseUnits(10),
            )
        };

        let signature = tokens
            .send_transfer(request, &SendOptions::default())
            .await
            .unwrap();

        let sent = rpc.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(*sent[0].message.recent_blockhash(), mock_lifetime(200).blockhash);
        assert_ne!(*sent[1].message.recent_blockhash(), mock_lifetime(200).blockhash);
        assert_eq!(sent[1].signatures[0], signature);
        assert_eq!(rpc.count("getLatestBlockhash"), 1);
    }

    #[tokio::test]
    async fn test_send_transfer_gives_up_after_second_failure() {
        let rpc = MockRpc::new();
        rpc.fail_next_send(already_processed());
        rpc.fail_next_send(already_processed());
        let tokens = token_helper(&rpc);
        let request = SplTransferRequest {
            ensure_destination_ata: false,
            ..SplTransferRequest::new(
                Arc::new(Keypair::new()),
                Pubkey::new_unique(),
                TransferAmount::BaseUnits(10),
            )
        };

        let error = tokens
            .send_transfer(request, &SendOptions::default())
            .await
            .unwrap_err();

        assert!(error.is_already_processed());
        assert_eq!(rpc.count("sendTransaction"), 2);
    }

    #[tokio::test]
    async fn test_send_transfer_does_not_retry_other_errors() {
        let rpc = MockRpc::new();
        rpc.fail_next_send(ClientErrorKind::TransactionError(
            LedgerTransactionError::InsufficientFundsForFee,
        ));
        let tokens = token_helper(&rpc);
        let request = SplTransferRequest {
            ensure_destination_ata: false,
            ..SplTransferRequest::new(
                Arc::new(Keypair::new()),
                Pubkey::new_unique(),
                TransferAmount::BaseUnits(10),
            )
        };

        let error = tokens
            .send_transfer(request, &SendOptions::default())
            .await
            .unwrap_err();

        assert!(!error.is_already_processed());
        assert_eq!(rpc.count("sendTransaction"), 1);
    }
}
