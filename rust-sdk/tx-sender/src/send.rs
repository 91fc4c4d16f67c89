use std::sync::Arc;

use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use tokio_util::sync::CancellationToken;

use crate::abort::{abortable, ensure_not_aborted};
use crate::error::{Result, TransactionError};
use crate::message::TransactionMessage;
use crate::signer::{PartialSigner, SendingSigner, TransactionSigner};

fn partial_signers(
    message: &TransactionMessage,
    exclude: Option<Pubkey>,
) -> Vec<Arc<dyn PartialSigner>> {
    let mut seen: Vec<Pubkey> = exclude.into_iter().collect();
    let mut signers = Vec::new();
    for signer in message.all_signers() {
        let TransactionSigner::Partial(partial) = signer else {
            continue;
        };
        let address = partial.address();
        if !seen.contains(&address) {
            seen.push(address);
            signers.push(partial.clone());
        }
    }
    signers
}

fn sending_signer(message: &TransactionMessage) -> Option<Arc<dyn SendingSigner>> {
    message.all_signers().find_map(|signer| match signer {
        TransactionSigner::Sending(sending) => Some(sending.clone()),
        TransactionSigner::Partial(_) => None,
    })
}

async fn partially_sign(
    mut transaction: VersionedTransaction,
    signers: &[Arc<dyn PartialSigner>],
    abort: Option<&CancellationToken>,
) -> Result<VersionedTransaction> {
    for signer in signers {
        ensure_not_aborted(abort)?;
        let mut signed = signer
            .modify_and_sign_transactions(vec![transaction])
            .await?;
        transaction = match (signed.pop(), signed.is_empty()) {
            (Some(transaction), true) => transaction,
            _ => {
                return Err(TransactionError::SigningError(format!(
                    "signer {} did not return exactly one transaction",
                    signer.address()
                )))
            }
        };
    }
    Ok(transaction)
}

fn missing_signers(transaction: &VersionedTransaction) -> Vec<Pubkey> {
    transaction
        .message
        .static_account_keys()
        .iter()
        .zip(&transaction.signatures)
        .filter(|(_, signature)| **signature == Signature::default())
        .map(|(address, _)| *address)
        .collect()
}

/// Signs `message` with every attached partial signer and checks that no required
/// signature is missing.
pub async fn sign_transaction_message_with_signers(
    message: &TransactionMessage,
    abort: Option<&CancellationToken>,
) -> Result<VersionedTransaction> {
    let transaction = message.to_unsigned_transaction()?;
    let transaction = partially_sign(transaction, &partial_signers(message, None), abort).await?;
    let missing = missing_signers(&transaction);
    if !missing.is_empty() {
        return Err(TransactionError::MissingSignatures(missing));
    }
    Ok(transaction)
}

/// Lets the partial signers sign first, then hands the transaction to the
/// attached sending signer for submission.
pub async fn sign_and_send_transaction_message_with_signers(
    message: &TransactionMessage,
    abort: Option<&CancellationToken>,
) -> Result<Signature> {
    let sender = sending_signer(message).ok_or_else(|| {
        TransactionError::CapabilityError(
            "no sending signer is attached to the transaction message".to_string(),
        )
    })?;
    let transaction = message.to_unsigned_transaction()?;
    let signers = partial_signers(message, Some(sender.address()));
    let transaction = partially_sign(transaction, &signers, abort).await?;
    let signatures = abortable(abort, sender.sign_and_send_transactions(vec![transaction])).await?;
    signatures.into_iter().next().ok_or_else(|| {
        TransactionError::WalletError("wallet returned no signature".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TransactionVersion;
    use crate::signer::{resolve_signer, WalletSession};
    use crate::tests::{mock_lifetime, MockSendingWallet, MockWallet};
    use solana_keypair::Keypair;
    use solana_signer::Signer;
    use solana_system_interface::instruction::transfer;

    fn keypair_signer(keypair: &Arc<Keypair>) -> TransactionSigner {
        resolve_signer(keypair.clone().into()).unwrap().signer
    }

    fn message_for(payer: TransactionSigner, authority: Pubkey) -> TransactionMessage {
        TransactionMessage::new(TransactionVersion::Legacy)
            .with_fee_payer_signer(payer)
            .with_appended_instructions([transfer(&authority, &Pubkey::new_unique(), 5)])
            .with_lifetime(mock_lifetime(200))
    }

    #[tokio::test]
    async fn test_signs_with_fee_payer_and_extra_signer() {
        let payer = Arc::new(Keypair::new());
        let authority = Arc::new(Keypair::new());
        let message = message_for(keypair_signer(&payer), authority.pubkey())
            .with_signers([keypair_signer(&authority)]);

        let transaction = sign_transaction_message_with_signers(&message, None)
            .await
            .unwrap();

        assert_eq!(transaction.signatures.len(), 2);
        assert!(transaction.verify_with_results().iter().all(|ok| *ok));
    }

    #[tokio::test]
    async fn test_missing_signature_is_reported() {
        let payer = Arc::new(Keypair::new());
        let authority = Pubkey::new_unique();
        let message = message_for(keypair_signer(&payer), authority);

        let error = sign_transaction_message_with_signers(&message, None)
            .await
            .unwrap_err();

        match error {
            TransactionError::MissingSignatures(missing) => assert_eq!(missing, vec![authority]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wallet_signature_is_merged() {
        let wallet = Arc::new(MockWallet::new());
        let session = WalletSession::new(wallet.address()).with_sign_transaction(wallet.clone());
        let signer = resolve_signer(session.into()).unwrap().signer;
        let message = message_for(signer, wallet.address());

        let transaction = sign_transaction_message_with_signers(&message, None)
            .await
            .unwrap();

        assert!(transaction.verify_with_results()[0]);
        assert_eq!(wallet.sign_calls(), 1);
    }

    #[tokio::test]
    async fn test_sending_signer_submits_after_partial_signers() {
        let wallet = Arc::new(MockSendingWallet::new());
        let session =
            WalletSession::new(wallet.address()).with_sign_and_send_transaction(wallet.clone());
        let sender = resolve_signer(session.into()).unwrap().signer;
        let co_signer = Arc::new(Keypair::new());
        let message = message_for(sender, co_signer.pubkey())
            .with_signers([keypair_signer(&co_signer)]);

        let signature = sign_and_send_transaction_message_with_signers(&message, None)
            .await
            .unwrap();

        let submitted = wallet.sent_transactions();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].signatures[0], signature);
        assert!(submitted[0].verify_with_results().iter().all(|ok| *ok));
    }

    #[tokio::test]
    async fn test_sign_and_send_without_sending_signer() {
        let payer = Arc::new(Keypair::new());
        let message = message_for(keypair_signer(&payer), payer.pubkey());
        let error = sign_and_send_transaction_message_with_signers(&message, None)
            .await
            .unwrap_err();
        assert!(matches!(error, TransactionError::CapabilityError(_)));
    }

    #[tokio::test]
    async fn test_signing_stops_when_aborted() {
        let payer = Arc::new(Keypair::new());
        let message = message_for(keypair_signer(&payer), payer.pubkey());
        let abort = CancellationToken::new();
        abort.cancel();
        let error = sign_transaction_message_with_signers(&message, Some(&abort))
            .await
            .unwrap_err();
        assert!(matches!(error, TransactionError::Aborted));
    }
}
