//! Checking a confirmed transaction against a [`TransferRequest`].

use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solpay::{AmountError, ErrorKind, TransferRequest};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::convert::AddressExt;
use crate::instructions::MEMO_PROGRAM_PUBKEY;
use crate::ledger::{ConfirmedTransaction, Finality, Ledger, LedgerError, TokenBalance};
use crate::token;
use crate::transfer::SOL_DECIMALS;

/// Reasons a transaction does not satisfy a transfer request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidateTransferError {
    /// The ledger does not know the transaction at the requested finality.
    #[error("transaction {0} not found")]
    NotFound(Signature),
    /// The transaction executed with an error.
    #[error("transaction failed: {0}")]
    Failed(String),
    /// A reference of the request is not among the account keys.
    #[error("reference {0} not found in transaction")]
    ReferenceMissing(Pubkey),
    /// No memo instruction carries the requested memo.
    #[error("memo not found in transaction")]
    MemoMismatch,
    /// The recipient (or its token account) is not part of the transaction.
    #[error("recipient {0} not found in transaction")]
    RecipientMissing(Pubkey),
    /// The recipient received less than requested.
    #[error("amount transferred {received} is below the requested {expected}")]
    AmountTooLow {
        /// Base units requested.
        expected: u64,
        /// Base units received.
        received: u64,
    },
    /// A transferred token is not the requested mint.
    #[error("token balance is for mint {found}, expected {expected}")]
    MintMismatch {
        /// Requested mint.
        expected: Pubkey,
        /// Mint found in the balances.
        found: Pubkey,
    },
    /// The requested amount is not representable.
    #[error(transparent)]
    Amount(#[from] AmountError),
    /// The ledger could not be queried.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ValidateTransferError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Ledger(_) => ErrorKind::Upstream,
            _ => ErrorKind::MalformedInput,
        }
    }
}

fn token_amount(balances: &[TokenBalance], index: u8) -> Option<&TokenBalance> {
    balances.iter().find(|balance| balance.account_index == index)
}

fn check_token_delta(
    tx: &ConfirmedTransaction,
    request: &TransferRequest,
    mint: Pubkey,
) -> Result<(), ValidateTransferError> {
    let recipient = request.recipient.to_pubkey();
    let keys = tx.account_keys();
    let candidates = [spl_token::id(), spl_token_2022::id()]
        .map(|program| token::associated_token_address(&recipient, &mint, &program));
    let index = keys
        .iter()
        .position(|key| candidates.contains(key))
        .and_then(|i| u8::try_from(i).ok())
        .ok_or(ValidateTransferError::RecipientMissing(recipient))?;

    let post = token_amount(&tx.meta.post_token_balances, index)
        .ok_or(ValidateTransferError::RecipientMissing(recipient))?;
    if post.mint != mint {
        return Err(ValidateTransferError::MintMismatch {
            expected: mint,
            found: post.mint,
        });
    }
    let pre = token_amount(&tx.meta.pre_token_balances, index).map_or(0, |b| b.amount);
    let received = post.amount.saturating_sub(pre);
    if let Some(amount) = request.amount {
        let expected = amount.to_base_units(post.decimals)?;
        if received < expected {
            return Err(ValidateTransferError::AmountTooLow { expected, received });
        }
    }
    Ok(())
}

fn check_native_delta(
    tx: &ConfirmedTransaction,
    request: &TransferRequest,
) -> Result<(), ValidateTransferError> {
    let recipient = request.recipient.to_pubkey();
    let index = tx
        .account_keys()
        .iter()
        .position(|key| *key == recipient)
        .ok_or(ValidateTransferError::RecipientMissing(recipient))?;
    let pre = tx.meta.pre_balances.get(index).copied().unwrap_or(0);
    let post = tx
        .meta
        .post_balances
        .get(index)
        .copied()
        .ok_or(ValidateTransferError::RecipientMissing(recipient))?;
    let received = post.saturating_sub(pre);
    if let Some(amount) = request.amount {
        let expected = amount.to_base_units(SOL_DECIMALS)?;
        if received < expected {
            return Err(ValidateTransferError::AmountTooLow { expected, received });
        }
    }
    Ok(())
}

/// Checks a confirmed transaction against `request`.
///
/// The transaction must have succeeded, list every reference among its
/// account keys, carry the requested memo in a memo instruction, and
/// increase the recipient's balance by at least the requested amount. The
/// recipient's balance is its lamports for SOL requests and the balance of
/// its associated token account for SPL requests. A request without amount
/// only requires the recipient to be part of the transaction.
///
/// Only statically listed keys are considered; keys loaded from address
/// lookup tables are not.
///
/// # Errors
///
/// Returns [`ValidateTransferError`] naming the first failed check.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "solpay.validate_transfer", skip_all, fields(signature = %signature), err)
)]
pub async fn validate_transfer<L: Ledger + ?Sized>(
    ledger: &L,
    signature: &Signature,
    request: &TransferRequest,
    finality: Finality,
) -> Result<ConfirmedTransaction, ValidateTransferError> {
    let tx = ledger
        .get_transaction(signature, finality)
        .await?
        .ok_or(ValidateTransferError::NotFound(*signature))?;
    if let Some(err) = &tx.meta.err {
        return Err(ValidateTransferError::Failed(err.clone()));
    }

    let keys = tx.account_keys();
    for reference in &request.references {
        let reference = reference.to_pubkey();
        if !keys.contains(&reference) {
            return Err(ValidateTransferError::ReferenceMissing(reference));
        }
    }

    if let Some(memo) = &request.memo {
        let found = tx.transaction.message.instructions().iter().any(|ix| {
            keys.get(usize::from(ix.program_id_index)) == Some(&MEMO_PROGRAM_PUBKEY)
                && ix.data == memo.as_bytes()
        });
        if !found {
            return Err(ValidateTransferError::MemoMismatch);
        }
    }

    match &request.spl_token {
        Some(mint) => check_token_delta(&tx, request, mint.to_pubkey())?,
        None => check_native_delta(&tx, request)?,
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use solana_message::Hash;
    use solpay::Reference;

    use super::*;
    use crate::convert::ToAddress;
    use crate::ledger::{InMemoryLedger, TransactionMeta};
    use crate::transfer::create_transfer;

    struct Paid {
        ledger: InMemoryLedger,
        request: TransferRequest,
        signature: Signature,
    }

    async fn pay_sol(memo: Option<&str>, meta: impl FnOnce(usize, usize, usize) -> TransactionMeta) -> Paid {
        let ledger = InMemoryLedger::new();
        ledger.set_blockhash(Hash::new_from_array([1; 32]));
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        ledger.fund(sender, 5_000_000_000);
        ledger.fund(recipient, 1_000_000_000);
        let mut request = TransferRequest::new(recipient.to_address())
            .with_amount("1".parse().unwrap())
            .with_reference(Reference::random());
        request.memo = memo.map(str::to_owned);

        let tx = create_transfer(&ledger, &sender, &request).await.unwrap();
        let keys = tx.inner().message.static_account_keys();
        let sender_index = keys.iter().position(|k| *k == sender).unwrap();
        let recipient_index = keys.iter().position(|k| *k == recipient).unwrap();
        let meta = meta(keys.len(), sender_index, recipient_index);
        let mut inner = tx.into_inner();
        inner.signatures[0] = Signature::from([7; 64]);
        let signature = ledger.record_transaction(inner, meta);
        Paid {
            ledger,
            request,
            signature,
        }
    }

    fn balances(len: usize, recipient: usize, pre: u64, post: u64) -> TransactionMeta {
        let mut meta = TransactionMeta {
            pre_balances: vec![0; len],
            post_balances: vec![0; len],
            ..TransactionMeta::default()
        };
        meta.pre_balances[recipient] = pre;
        meta.post_balances[recipient] = post;
        meta
    }

    #[tokio::test]
    async fn test_valid_sol_transfer() {
        let paid = pay_sol(Some("order-1"), |len, _, r| {
            balances(len, r, 1_000_000_000, 2_000_000_000)
        })
        .await;
        let tx = validate_transfer(&paid.ledger, &paid.signature, &paid.request, Finality::Confirmed)
            .await
            .unwrap();
        assert_eq!(tx.signature(), Some(paid.signature));
    }

    #[tokio::test]
    async fn test_amount_too_low() {
        let paid = pay_sol(None, |len, _, r| balances(len, r, 1_000_000_000, 1_500_000_000)).await;
        let err = validate_transfer(&paid.ledger, &paid.signature, &paid.request, Finality::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ValidateTransferError::AmountTooLow {
                expected: 1_000_000_000,
                received: 500_000_000
            }
        );
    }

    #[tokio::test]
    async fn test_failed_transaction() {
        let paid = pay_sol(None, |len, _, r| {
            let mut meta = balances(len, r, 0, 0);
            meta.err = Some("InsufficientFundsForFee".into());
            meta
        })
        .await;
        let err = validate_transfer(&paid.ledger, &paid.signature, &paid.request, Finality::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidateTransferError::Failed(_)));
    }

    #[tokio::test]
    async fn test_reference_and_memo_mismatch() {
        let paid = pay_sol(Some("order-1"), |len, _, r| balances(len, r, 0, 1_000_000_000)).await;

        let mut request = paid.request.clone();
        let stray = Reference::random();
        request.references.push(stray);
        let err = validate_transfer(&paid.ledger, &paid.signature, &request, Finality::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(err, ValidateTransferError::ReferenceMissing(stray.to_pubkey()));

        let mut request = paid.request.clone();
        request.memo = Some("order-2".into());
        let err = validate_transfer(&paid.ledger, &paid.signature, &request, Finality::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(err, ValidateTransferError::MemoMismatch);
    }

    #[tokio::test]
    async fn test_unknown_signature() {
        let ledger = InMemoryLedger::new();
        let request = TransferRequest::new(Pubkey::new_unique().to_address());
        let signature = Signature::from([3; 64]);
        let err = validate_transfer(&ledger, &signature, &request, Finality::Finalized)
            .await
            .unwrap_err();
        assert_eq!(err, ValidateTransferError::NotFound(signature));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_valid_token_transfer() {
        let ledger = InMemoryLedger::new();
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        ledger.fund(sender, 1_000_000_000);
        ledger.add_mint(mint, 6, &spl_token::id());
        ledger.add_token_account(sender, mint, 10_000_000, &spl_token::id());
        let destination = ledger.add_token_account(recipient, mint, 0, &spl_token::id());
        let request = TransferRequest::new(recipient.to_address())
            .with_amount("2.5".parse().unwrap())
            .with_spl_token(mint.to_address());

        let tx = create_transfer(&ledger, &sender, &request).await.unwrap();
        let keys = tx.inner().message.static_account_keys();
        let index = u8::try_from(keys.iter().position(|k| *k == destination).unwrap()).unwrap();
        let balance = |amount| TokenBalance {
            account_index: index,
            mint,
            amount,
            decimals: 6,
        };
        let meta = TransactionMeta {
            pre_token_balances: vec![balance(0)],
            post_token_balances: vec![balance(2_500_000)],
            ..TransactionMeta::default()
        };
        let mut inner = tx.into_inner();
        inner.signatures[0] = Signature::from([8; 64]);
        let signature = ledger.record_transaction(inner, meta);

        validate_transfer(&ledger, &signature, &request, Finality::Confirmed)
            .await
            .unwrap();

        let greedy = request.clone().with_amount("3".parse().unwrap());
        let err = validate_transfer(&ledger, &signature, &greedy, Finality::Confirmed)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ValidateTransferError::AmountTooLow {
                expected: 3_000_000,
                received: 2_500_000
            }
        );
    }
}
