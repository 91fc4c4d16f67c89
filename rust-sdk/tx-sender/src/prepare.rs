use solana_commitment_config::CommitmentLevel;
use solana_instruction::Instruction;
use solana_message::AddressLookupTableAccount;
use solana_pubkey::Pubkey;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::abort::ensure_not_aborted;
use crate::compute_budget::{compute_budget_prefix, get_compute_unit_limit, get_compute_unit_price};
use crate::error::{Result, TransactionError};
use crate::message::{
    fetch_latest_lifetime, BlockhashLifetime, TransactionMessage, TransactionVersion,
    VersionRequest,
};
use crate::signer::{resolve_signer, ResolvedSigner, SignerMode, SignerSource, TransactionSigner};

/// Who pays the transaction fee.
#[derive(Debug, Clone)]
pub enum FeePayer {
    /// Fee payer address whose signature comes from an authority or extra signer
    Address(Pubkey),
    Signer(SignerSource),
}

impl FeePayer {
    pub fn address(&self) -> Pubkey {
        match self {
            Self::Address(address) => *address,
            Self::Signer(source) => source.address(),
        }
    }
}

impl From<Pubkey> for FeePayer {
    fn from(address: Pubkey) -> Self {
        Self::Address(address)
    }
}

impl From<SignerSource> for FeePayer {
    fn from(source: SignerSource) -> Self {
        Self::Signer(source)
    }
}

/// Everything needed to turn instructions into a [`PreparedTransaction`]
#[derive(Debug, Clone, Default)]
pub struct PrepareRequest {
    pub instructions: Vec<Instruction>,
    pub authority: Option<SignerSource>,
    pub fee_payer: Option<FeePayer>,
    pub commitment: Option<CommitmentLevel>,
    pub version: VersionRequest,
    pub compute_unit_limit: Option<u32>,
    pub compute_unit_price: Option<u64>,
    /// Reused as-is; fetched from the cluster when absent
    pub lifetime: Option<BlockhashLifetime>,
    pub address_lookup_tables: Vec<AddressLookupTableAccount>,
    pub additional_signers: Vec<TransactionSigner>,
    pub abort: Option<CancellationToken>,
}

impl PrepareRequest {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Self::default()
        }
    }

    pub fn with_authority(mut self, authority: impl Into<SignerSource>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn with_fee_payer(mut self, fee_payer: impl Into<FeePayer>) -> Self {
        self.fee_payer = Some(fee_payer.into());
        self
    }
}

/// A transaction message ready for signing, plus the context it was built with.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    commitment: CommitmentLevel,
    compute_unit_limit: Option<u32>,
    compute_unit_price: Option<u64>,
    fee_payer: Pubkey,
    lifetime: BlockhashLifetime,
    message: TransactionMessage,
    mode: SignerMode,
    version: TransactionVersion,
}

impl PreparedTransaction {
    pub fn commitment(&self) -> CommitmentLevel {
        self.commitment
    }

    pub fn compute_unit_limit(&self) -> Option<u32> {
        self.compute_unit_limit
    }

    pub fn compute_unit_price(&self) -> Option<u64> {
        self.compute_unit_price
    }

    pub fn fee_payer(&self) -> Pubkey {
        self.fee_payer
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.message.instructions()
    }

    pub fn lifetime(&self) -> BlockhashLifetime {
        self.lifetime
    }

    pub fn message(&self) -> &TransactionMessage {
        &self.message
    }

    pub fn mode(&self) -> SignerMode {
        self.mode
    }

    pub fn version(&self) -> TransactionVersion {
        self.version
    }

    /// Copy of this transaction carrying `message`, for example after compute tuning.
    pub fn with_message(&self, message: TransactionMessage) -> Result<Self> {
        let lifetime = message.lifetime().ok_or_else(|| {
            TransactionError::CompileError("transaction message has no lifetime".to_string())
        })?;
        Ok(Self {
            compute_unit_limit: get_compute_unit_limit(message.instructions()),
            compute_unit_price: get_compute_unit_price(message.instructions()),
            lifetime,
            version: message.version(),
            message,
            ..self.clone()
        })
    }
}

struct FeePayerResolution {
    address: Pubkey,
    signer: Option<TransactionSigner>,
    mode: SignerMode,
}

fn resolve_fee_payer(
    fee_payer: Option<FeePayer>,
    authority: Option<&ResolvedSigner>,
) -> Result<FeePayerResolution> {
    let from_resolved = |resolved: &ResolvedSigner| FeePayerResolution {
        address: resolved.signer.address(),
        signer: Some(resolved.signer.clone()),
        mode: resolved.mode,
    };
    match (fee_payer, authority) {
        (None, Some(authority)) => Ok(from_resolved(authority)),
        (None, None) => Err(TransactionError::validation("a fee payer must be provided")),
        (Some(fee_payer), Some(authority)) if fee_payer.address() == authority.signer.address() => {
            Ok(from_resolved(authority))
        }
        (Some(FeePayer::Signer(source)), None) => Ok(from_resolved(&resolve_signer(source)?)),
        // A sending wallet cannot co-sign a transaction another signer submits.
        (Some(FeePayer::Signer(source)), Some(_)) => Ok(FeePayerResolution {
            mode: SignerMode::Partial,
            ..from_resolved(&resolve_signer(source)?)
        }),
        (Some(FeePayer::Address(address)), _) => Ok(FeePayerResolution {
            address,
            signer: None,
            mode: SignerMode::Partial,
        }),
    }
}

/// Builds a [`PreparedTransaction`] from `request`.
pub(crate) async fn prepare_transaction_request(
    rpc: &RpcClient,
    default_commitment: CommitmentLevel,
    request: PrepareRequest,
) -> Result<PreparedTransaction> {
    let PrepareRequest {
        instructions,
        authority,
        fee_payer,
        commitment,
        version,
        compute_unit_limit,
        compute_unit_price,
        lifetime,
        address_lookup_tables,
        additional_signers,
        abort,
    } = request;
    let abort = abort.as_ref();

    if instructions.is_empty() {
        return Err(TransactionError::validation(
            "add at least one instruction before preparing a transaction",
        ));
    }
    ensure_not_aborted(abort)?;

    let commitment = commitment.unwrap_or(default_commitment);
    let authority = authority.map(resolve_signer).transpose()?;
    let fee_payer = resolve_fee_payer(fee_payer, authority.as_ref())?;
    let mode = fee_payer.mode;

    let version = version.resolve(&instructions, &address_lookup_tables);
    let prefix = compute_budget_prefix(&instructions, compute_unit_limit, compute_unit_price);
    let instructions: Vec<Instruction> = prefix.into_iter().chain(instructions).collect();

    let lifetime = match lifetime {
        Some(lifetime) => lifetime,
        None => fetch_latest_lifetime(rpc, commitment, abort).await?,
    };
    ensure_not_aborted(abort)?;

    let mut message = TransactionMessage::new(version);
    message = match fee_payer.signer {
        Some(signer) => message.with_fee_payer_signer(signer),
        None => message.with_fee_payer(fee_payer.address),
    };
    let extra_signers = authority
        .map(|authority| authority.signer)
        .filter(|signer| signer.address() != fee_payer.address)
        .into_iter()
        .chain(additional_signers);
    let message = message
        .with_appended_instructions(instructions)
        .with_address_lookup_tables(address_lookup_tables)
        .with_signers(extra_signers)
        .with_lifetime(lifetime);

    debug!(
        fee_payer = %fee_payer.address,
        ?version,
        ?mode,
        instructions = message.instructions().len(),
        "prepared transaction"
    );

    Ok(PreparedTransaction {
        commitment,
        compute_unit_limit: get_compute_unit_limit(message.instructions()),
        compute_unit_price: get_compute_unit_price(message.instructions()),
        fee_payer: fee_payer.address,
        lifetime,
        message,
        mode,
        version,
    })
}
