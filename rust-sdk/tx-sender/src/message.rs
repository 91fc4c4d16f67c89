use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_hash::Hash;
use solana_instruction::Instruction;
use solana_message::{legacy, v0, AddressLookupTableAccount, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use tokio_util::sync::CancellationToken;

use crate::abort::abortable;
use crate::error::{Result, TransactionError};
use crate::signer::TransactionSigner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionVersion {
    Legacy,
    V0,
}

/// Version selection for a prepare request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionRequest {
    /// `V0` when an instruction references an account from a supplied lookup
    /// table, otherwise `Legacy`.
    #[default]
    Auto,
    Fixed(TransactionVersion),
}

impl From<TransactionVersion> for VersionRequest {
    fn from(version: TransactionVersion) -> Self {
        Self::Fixed(version)
    }
}

impl VersionRequest {
    pub(crate) fn resolve(
        self,
        instructions: &[Instruction],
        address_lookup_tables: &[AddressLookupTableAccount],
    ) -> TransactionVersion {
        match self {
            Self::Fixed(version) => version,
            Self::Auto if references_lookup_table(instructions, address_lookup_tables) => {
                TransactionVersion::V0
            }
            Self::Auto => TransactionVersion::Legacy,
        }
    }
}

fn references_lookup_table(
    instructions: &[Instruction],
    address_lookup_tables: &[AddressLookupTableAccount],
) -> bool {
    instructions
        .iter()
        .flat_map(|instruction| &instruction.accounts)
        .any(|meta| {
            address_lookup_tables
                .iter()
                .any(|table| table.addresses.contains(&meta.pubkey))
        })
}

/// A recent blockhash and the last block height at which it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashLifetime {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

pub(crate) async fn fetch_latest_lifetime(
    rpc: &RpcClient,
    commitment: CommitmentLevel,
    abort: Option<&CancellationToken>,
) -> Result<BlockhashLifetime> {
    let (blockhash, last_valid_block_height) = abortable(
        abort,
        rpc.get_latest_blockhash_with_commitment(CommitmentConfig { commitment }),
    )
    .await?;
    Ok(BlockhashLifetime {
        blockhash,
        last_valid_block_height,
    })
}

/// An immutable description of a transaction before compilation.
///
/// Every `with_*` method consumes the message and returns the updated copy, so a
/// caller holding a clone keeps the original unchanged.
#[derive(Debug, Clone)]
pub struct TransactionMessage {
    version: TransactionVersion,
    fee_payer: Option<Pubkey>,
    fee_payer_signer: Option<TransactionSigner>,
    instructions: Vec<Instruction>,
    lifetime: Option<BlockhashLifetime>,
    address_lookup_tables: Vec<AddressLookupTableAccount>,
    signers: Vec<TransactionSigner>,
}

impl TransactionMessage {
    pub fn new(version: TransactionVersion) -> Self {
        Self {
            version,
            fee_payer: None,
            fee_payer_signer: None,
            instructions: Vec::new(),
            lifetime: None,
            address_lookup_tables: Vec::new(),
            signers: Vec::new(),
        }
    }

    /// Sets a fee payer that must be signed for by one of the attached signers.
    pub fn with_fee_payer(mut self, fee_payer: Pubkey) -> Self {
        self.fee_payer = Some(fee_payer);
        self.fee_payer_signer = None;
        self
    }

    pub fn with_fee_payer_signer(mut self, signer: TransactionSigner) -> Self {
        self.fee_payer = Some(signer.address());
        self.fee_payer_signer = Some(signer);
        self
    }

    pub fn with_appended_instructions(
        mut self,
        instructions: impl IntoIterator<Item = Instruction>,
    ) -> Self {
        self.instructions.extend(instructions);
        self
    }

    /// Replaces the instruction at `index`; an out-of-range index appends instead.
    pub fn with_replaced_instruction(mut self, index: usize, instruction: Instruction) -> Self {
        match self.instructions.get_mut(index) {
            Some(slot) => *slot = instruction,
            None => self.instructions.push(instruction),
        }
        self
    }

    pub fn with_lifetime(mut self, lifetime: BlockhashLifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_address_lookup_tables(mut self, tables: Vec<AddressLookupTableAccount>) -> Self {
        self.address_lookup_tables = tables;
        self
    }

    /// Attaches signers besides the fee payer. Duplicates of an address are ignored.
    pub fn with_signers(mut self, signers: impl IntoIterator<Item = TransactionSigner>) -> Self {
        for signer in signers {
            let address = signer.address();
            if !self.signers.iter().any(|s| s.address() == address) {
                self.signers.push(signer);
            }
        }
        self
    }

    pub fn version(&self) -> TransactionVersion {
        self.version
    }

    pub fn fee_payer(&self) -> Option<Pubkey> {
        self.fee_payer
    }

    pub fn fee_payer_signer(&self) -> Option<&TransactionSigner> {
        self.fee_payer_signer.as_ref()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn lifetime(&self) -> Option<BlockhashLifetime> {
        self.lifetime
    }

    pub fn address_lookup_tables(&self) -> &[AddressLookupTableAccount] {
        &self.address_lookup_tables
    }

    pub fn signers(&self) -> &[TransactionSigner] {
        &self.signers
    }

    /// The fee payer signer followed by the other attached signers.
    pub fn all_signers(&self) -> impl Iterator<Item = &TransactionSigner> {
        self.fee_payer_signer.iter().chain(self.signers.iter())
    }

    pub fn compile(&self) -> Result<VersionedMessage> {
        let fee_payer = self.fee_payer.ok_or_else(|| {
            TransactionError::CompileError("transaction message has no fee payer".to_string())
        })?;
        let lifetime = self.lifetime.ok_or_else(|| {
            TransactionError::CompileError("transaction message has no lifetime".to_string())
        })?;
        match self.version {
            TransactionVersion::Legacy => {
                Ok(VersionedMessage::Legacy(legacy::Message::new_with_blockhash(
                    &self.instructions,
                    Some(&fee_payer),
                    &lifetime.blockhash,
                )))
            }
            TransactionVersion::V0 => v0::Message::try_compile(
                &fee_payer,
                &self.instructions,
                &self.address_lookup_tables,
                lifetime.blockhash,
            )
            .map(VersionedMessage::V0)
            .map_err(|e| TransactionError::CompileError(e.to_string())),
        }
    }

    /// Compiles the message into a transaction with every signature slot empty.
    pub fn to_unsigned_transaction(&self) -> Result<VersionedTransaction> {
        let message = self.compile()?;
        let signatures =
            vec![Signature::default(); usize::from(message.header().num_required_signatures)];
        Ok(VersionedTransaction {
            signatures,
            message,
        })
    }

    /// Base64 wire encoding of the unsigned transaction.
    pub fn to_base64_wire(&self) -> Result<String> {
        encode_wire_transaction(&self.to_unsigned_transaction()?)
    }
}

/// Base64 encoding of the bincode-serialized transaction.
pub fn encode_wire_transaction(transaction: &VersionedTransaction) -> Result<String> {
    let bytes = bincode::serialize(transaction)?;
    Ok(STANDARD.encode(bytes))
}
