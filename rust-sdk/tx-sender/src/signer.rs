use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use solana_message::VersionedMessage;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;

use crate::error::{Result, TransactionError};

/// How a resolved signer participates in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerMode {
    /// The signer produces signatures; submission goes through RPC.
    Partial,
    /// The signer's wallet signs and submits in one step.
    Send,
}

/// A signer that returns signed copies of the transactions it is given.
#[async_trait]
pub trait PartialSigner: Send + Sync {
    fn address(&self) -> Pubkey;

    /// Signs each transaction, returning them in the same order. Signatures already
    /// present on the input must be preserved.
    async fn modify_and_sign_transactions(
        &self,
        transactions: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>>;
}

/// A signer that signs and submits, returning only the network signatures.
#[async_trait]
pub trait SendingSigner: Send + Sync {
    fn address(&self) -> Pubkey;

    async fn sign_and_send_transactions(
        &self,
        transactions: Vec<VersionedTransaction>,
    ) -> Result<Vec<Signature>>;
}

/// Every signer the pipeline knows how to drive.
#[derive(Clone)]
pub enum TransactionSigner {
    Partial(Arc<dyn PartialSigner>),
    Sending(Arc<dyn SendingSigner>),
}

impl TransactionSigner {
    pub fn address(&self) -> Pubkey {
        match self {
            Self::Partial(signer) => signer.address(),
            Self::Sending(signer) => signer.address(),
        }
    }

    pub fn mode(&self) -> SignerMode {
        match self {
            Self::Partial(_) => SignerMode::Partial,
            Self::Sending(_) => SignerMode::Send,
        }
    }
}

impl fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Wallet capability: sign a transaction without submitting it.
#[async_trait]
pub trait WalletSignTransaction: Send + Sync {
    async fn sign_transaction(
        &self,
        transaction: VersionedTransaction,
    ) -> Result<VersionedTransaction>;
}

/// Wallet capability: sign and submit a transaction.
#[async_trait]
pub trait WalletSignAndSendTransaction: Send + Sync {
    /// Returns the base-58 encoded signature of the submitted transaction.
    async fn sign_and_send_transaction(&self, transaction: VersionedTransaction)
        -> Result<String>;
}

/// A connected wallet account and the capabilities its wallet exposes.
#[derive(Clone)]
pub struct WalletSession {
    account: Pubkey,
    sign_transaction: Option<Arc<dyn WalletSignTransaction>>,
    sign_and_send_transaction: Option<Arc<dyn WalletSignAndSendTransaction>>,
}

impl WalletSession {
    pub fn new(account: Pubkey) -> Self {
        Self {
            account,
            sign_transaction: None,
            sign_and_send_transaction: None,
        }
    }

    pub fn with_sign_transaction(mut self, capability: Arc<dyn WalletSignTransaction>) -> Self {
        self.sign_transaction = Some(capability);
        self
    }

    pub fn with_sign_and_send_transaction(
        mut self,
        capability: Arc<dyn WalletSignAndSendTransaction>,
    ) -> Self {
        self.sign_and_send_transaction = Some(capability);
        self
    }

    pub fn account(&self) -> Pubkey {
        self.account
    }
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("account", &self.account)
            .field("sign_transaction", &self.sign_transaction.is_some())
            .field(
                "sign_and_send_transaction",
                &self.sign_and_send_transaction.is_some(),
            )
            .finish()
    }
}

/// Anything that can be turned into a [`TransactionSigner`].
#[derive(Clone)]
pub enum SignerSource {
    Session(WalletSession),
    Signer(TransactionSigner),
    Keypair(Arc<dyn Signer + Send + Sync>),
}

impl SignerSource {
    pub fn address(&self) -> Pubkey {
        match self {
            Self::Session(session) => session.account(),
            Self::Signer(signer) => signer.address(),
            Self::Keypair(keypair) => keypair.pubkey(),
        }
    }
}

impl fmt::Debug for SignerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(session) => f.debug_tuple("Session").field(session).finish(),
            Self::Signer(signer) => f.debug_tuple("Signer").field(signer).finish(),
            Self::Keypair(keypair) => f.debug_tuple("Keypair").field(&keypair.pubkey()).finish(),
        }
    }
}

impl From<WalletSession> for SignerSource {
    fn from(session: WalletSession) -> Self {
        Self::Session(session)
    }
}

impl From<TransactionSigner> for SignerSource {
    fn from(signer: TransactionSigner) -> Self {
        Self::Signer(signer)
    }
}

impl<T: Signer + Send + Sync + 'static> From<Arc<T>> for SignerSource {
    fn from(signer: Arc<T>) -> Self {
        Self::Keypair(signer)
    }
}

/// A signer together with the mode it was classified as.
#[derive(Debug, Clone)]
pub struct ResolvedSigner {
    pub signer: TransactionSigner,
    pub mode: SignerMode,
}

/// Classifies a signer source once.
///
/// Wallet sessions prefer their sign-transaction capability and fall back to
/// sign-and-send. Plain keypairs always become partial signers.
pub fn resolve_signer(source: SignerSource) -> Result<ResolvedSigner> {
    let signer = match source {
        SignerSource::Signer(signer) => signer,
        SignerSource::Keypair(keypair) => {
            TransactionSigner::Partial(Arc::new(KeypairSigner::new(keypair)))
        }
        SignerSource::Session(session) => {
            if let Some(wallet) = session.sign_transaction {
                TransactionSigner::Partial(Arc::new(WalletPartialSigner {
                    address: session.account,
                    wallet,
                }))
            } else if let Some(wallet) = session.sign_and_send_transaction {
                TransactionSigner::Sending(Arc::new(WalletSendingSigner {
                    address: session.account,
                    wallet,
                }))
            } else {
                return Err(TransactionError::CapabilityError(
                    "wallet session does not support signing or sending".to_string(),
                ));
            }
        }
    };
    let mode = signer.mode();
    Ok(ResolvedSigner { signer, mode })
}

/// Partial signer backed by an in-process keypair.
pub struct KeypairSigner {
    signer: Arc<dyn Signer + Send + Sync>,
}

impl KeypairSigner {
    pub fn new(signer: Arc<dyn Signer + Send + Sync>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl PartialSigner for KeypairSigner {
    fn address(&self) -> Pubkey {
        self.signer.pubkey()
    }

    async fn modify_and_sign_transactions(
        &self,
        transactions: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>> {
        let address = self.address();
        transactions
            .into_iter()
            .map(|mut transaction| {
                let index = signer_index(&transaction.message, &address).ok_or_else(|| {
                    TransactionError::SigningError(format!(
                        "{address} is not a required signer of the transaction"
                    ))
                })?;
                let signature = self
                    .signer
                    .try_sign_message(&transaction.message.serialize())
                    .map_err(|e| TransactionError::SigningError(e.to_string()))?;
                let slot = transaction.signatures.get_mut(index).ok_or_else(|| {
                    TransactionError::SigningError(format!(
                        "transaction has no signature slot for {address}"
                    ))
                })?;
                *slot = signature;
                Ok(transaction)
            })
            .collect()
    }
}

struct WalletPartialSigner {
    address: Pubkey,
    wallet: Arc<dyn WalletSignTransaction>,
}

#[async_trait]
impl PartialSigner for WalletPartialSigner {
    fn address(&self) -> Pubkey {
        self.address
    }

    async fn modify_and_sign_transactions(
        &self,
        transactions: Vec<VersionedTransaction>,
    ) -> Result<Vec<VersionedTransaction>> {
        let mut signed_transactions = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let signed = self.wallet.sign_transaction(transaction.clone()).await?;
            signed_transactions.push(merge_signatures(&transaction, &signed, &self.address)?);
        }
        Ok(signed_transactions)
    }
}

struct WalletSendingSigner {
    address: Pubkey,
    wallet: Arc<dyn WalletSignAndSendTransaction>,
}

#[async_trait]
impl SendingSigner for WalletSendingSigner {
    fn address(&self) -> Pubkey {
        self.address
    }

    async fn sign_and_send_transactions(
        &self,
        transactions: Vec<VersionedTransaction>,
    ) -> Result<Vec<Signature>> {
        let mut signatures = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let encoded = self.wallet.sign_and_send_transaction(transaction).await?;
            signatures.push(decode_signature(&encoded)?);
        }
        Ok(signatures)
    }
}

/// Copies the wallet's signatures onto the original transaction. The original is
/// left untouched; the expected signer's slot must have been filled.
fn merge_signatures(
    original: &VersionedTransaction,
    signed: &VersionedTransaction,
    expected: &Pubkey,
) -> Result<VersionedTransaction> {
    let populated = signer_index(&original.message, expected)
        .and_then(|index| signed.signatures.get(index))
        .is_some_and(|signature| *signature != Signature::default());
    if !populated {
        return Err(TransactionError::CapabilityError(
            "wallet did not populate the expected signature".to_string(),
        ));
    }

    let mut merged = original.clone();
    for (slot, signature) in merged.signatures.iter_mut().zip(&signed.signatures) {
        if *signature != Signature::default() {
            *slot = *signature;
        }
    }
    Ok(merged)
}

fn decode_signature(encoded: &str) -> Result<Signature> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| TransactionError::WalletError(format!("invalid signature {encoded}: {e}")))?;
    let bytes: [u8; 64] = bytes.try_into().map_err(|_| {
        TransactionError::WalletError(format!("signature {encoded} is not 64 bytes"))
    })?;
    Ok(Signature::from(bytes))
}

/// Position of `address` among the message's required signers.
pub(crate) fn signer_index(message: &VersionedMessage, address: &Pubkey) -> Option<usize> {
    let required = usize::from(message.header().num_required_signatures);
    message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| key == address)
}
