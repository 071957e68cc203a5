//! Solana implementation of the transaction-request responder.
//!
//! [`SolanaResponder`] answers `GET` with fixed metadata and `POST` with a v0
//! transaction paid by the requesting account. The transaction carries the
//! configured [`TransferAction`]; when a server signer is configured, the
//! server's key is added to the transfer instruction as a read-only signer
//! and its slot is signed before the transaction is returned. The
//! requesting wallet's slot is always left empty, and a request whose
//! account is the server signer is refused.

use std::fmt;
use std::sync::Arc;

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solpay::proto::{TransactionMetadata, TransactionResponse};
use solpay::responder::{BoxFuture, Responder, ResponderError, TransactionRequestContext};
use solpay::{Address, Amount, ErrorKind, Reference, TransferRequest};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::convert::AddressExt;
use crate::gate::GatePredicate;
use crate::ledger::Ledger;
use crate::transaction::PartialTransaction;
use crate::transfer::{self, TransferError};

/// A fixed transfer the endpoint asks the wallet to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAction {
    /// Wallet receiving the transfer.
    pub recipient: Address,
    /// Amount in SOL, or in whole tokens when `spl_token` is set.
    pub amount: Amount,
    /// Mint of the SPL token. Native SOL when absent.
    pub spl_token: Option<Address>,
    /// References embedded in every transaction.
    pub references: Vec<Reference>,
    /// Memo recorded with the transfer.
    pub memo: Option<String>,
}

impl TransferAction {
    /// Creates a native SOL transfer.
    #[must_use]
    pub const fn new(recipient: Address, amount: Amount) -> Self {
        Self {
            recipient,
            amount,
            spl_token: None,
            references: Vec::new(),
            memo: None,
        }
    }

    /// Transfers an SPL token instead of SOL.
    #[must_use]
    pub const fn with_spl_token(mut self, mint: Address) -> Self {
        self.spl_token = Some(mint);
        self
    }

    /// Adds a reference embedded in every transaction.
    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Sets the memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    fn to_request(&self, extra_references: &[Reference]) -> TransferRequest {
        let mut request = TransferRequest::new(self.recipient).with_amount(self.amount);
        request.spl_token = self.spl_token;
        request.references = self
            .references
            .iter()
            .chain(extra_references)
            .copied()
            .collect();
        request.memo.clone_from(&self.memo);
        request
    }
}

/// Immutable configuration of a [`SolanaResponder`].
pub struct ResponderConfig {
    /// Returned by `GET`.
    pub metadata: TransactionMetadata,
    /// Returned alongside every transaction.
    pub message: Option<String>,
    /// The transfer every transaction performs.
    pub action: TransferAction,
    /// Co-signs every transaction when present.
    pub signer: Option<Keypair>,
}

impl fmt::Debug for ResponderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderConfig")
            .field("metadata", &self.metadata)
            .field("message", &self.message)
            .field("action", &self.action)
            .field("signer", &self.signer.as_ref().map(Signer::pubkey))
            .finish()
    }
}

impl ResponderConfig {
    /// Creates a configuration without message or signer.
    #[must_use]
    pub const fn new(metadata: TransactionMetadata, action: TransferAction) -> Self {
        Self {
            metadata,
            message: None,
            action,
            signer: None,
        }
    }

    /// Sets the message returned with every transaction.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the server signer.
    #[must_use]
    pub fn with_signer(mut self, signer: Keypair) -> Self {
        self.signer = Some(signer);
        self
    }
}

/// Builds transactions for one transaction-request link.
///
/// Holds only read-only state; one instance serves concurrent requests.
pub struct SolanaResponder<G: ?Sized, L: ?Sized> {
    config: ResponderConfig,
    gate: Arc<G>,
    ledger: Arc<L>,
}

impl<G: ?Sized, L: ?Sized> fmt::Debug for SolanaResponder<G, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaResponder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn responder_error(err: TransferError) -> ResponderError {
    match err.kind() {
        ErrorKind::Upstream => ResponderError::Upstream(err.to_string()),
        _ => ResponderError::Internal(err.to_string()),
    }
}

impl<G, L> SolanaResponder<G, L>
where
    G: GatePredicate + ?Sized,
    L: Ledger + ?Sized,
{
    /// Creates a responder.
    ///
    /// # Errors
    ///
    /// Returns [`ResponderError::Misconfigured`] if the metadata is invalid.
    pub fn new(
        config: ResponderConfig,
        gate: Arc<G>,
        ledger: Arc<L>,
    ) -> Result<Self, ResponderError> {
        config
            .metadata
            .validate()
            .map_err(|e| ResponderError::Misconfigured(e.to_string()))?;
        Ok(Self {
            config,
            gate,
            ledger,
        })
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Builds the transaction for `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ResponderError`] classified by the failing step.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "solpay.responder.transaction", skip_all, fields(account = %context.account), err)
    )]
    pub async fn build_transaction(
        &self,
        context: &TransactionRequestContext,
    ) -> Result<TransactionResponse, ResponderError> {
        let account = context
            .account
            .parse::<Address>()
            .map_err(|e| ResponderError::InvalidAccount(e.to_string()))?
            .to_pubkey();
        let witness: Option<Pubkey> = self.config.signer.as_ref().map(Signer::pubkey);
        if witness == Some(account) {
            return Err(ResponderError::InvalidAccount(
                "account is the server signer".to_owned(),
            ));
        }

        let allowed = self
            .gate
            .allows(&account)
            .await
            .map_err(|e| ResponderError::Upstream(e.to_string()))?;
        if !allowed {
            #[cfg(feature = "telemetry")]
            tracing::info!(%account, "gate rejected account");
            return Err(ResponderError::Forbidden);
        }

        let request = self.config.action.to_request(&context.references);
        let instructions =
            transfer::transfer_instructions(&*self.ledger, &account, &request, witness.as_ref())
                .await
                .map_err(responder_error)?;
        let blockhash = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(|e| ResponderError::Upstream(e.to_string()))?;

        let mut tx = PartialTransaction::compile(&account, &instructions, blockhash)
            .map_err(|e| ResponderError::Internal(e.to_string()))?;
        if let Some(signer) = &self.config.signer {
            tx = tx
                .sign_with(signer)
                .map_err(|e| ResponderError::Internal(e.to_string()))?;
        }
        let transaction = tx
            .to_base64()
            .map_err(|e| ResponderError::Internal(e.to_string()))?;

        Ok(TransactionResponse {
            transaction,
            message: self.config.message.clone(),
        })
    }
}

impl<G, L> Responder for SolanaResponder<G, L>
where
    G: GatePredicate + ?Sized + 'static,
    L: Ledger + ?Sized + 'static,
{
    fn metadata(&self) -> BoxFuture<'_, Result<TransactionMetadata, ResponderError>> {
        let metadata = self.config.metadata.clone();
        Box::pin(async move { Ok(metadata) })
    }

    fn transaction(
        &self,
        context: TransactionRequestContext,
    ) -> BoxFuture<'_, Result<TransactionResponse, ResponderError>> {
        Box::pin(async move { self.build_transaction(&context).await })
    }
}

#[cfg(test)]
mod tests {
    use solana_message::Hash;
    use solana_signature::Signature;

    use super::*;
    use crate::convert::ToAddress;
    use crate::gate::{AllowAll, FnGate};
    use crate::instructions::{self, MEMO_PROGRAM_PUBKEY, SYSTEM_PROGRAM_PUBKEY};
    use crate::ledger::InMemoryLedger;

    fn metadata() -> TransactionMetadata {
        TransactionMetadata::new("Coffee Shop", "https://example.com/icon.svg".parse().unwrap())
            .unwrap()
    }

    fn setup() -> (Arc<InMemoryLedger>, Pubkey) {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_blockhash(Hash::new_from_array([5; 32]));
        (ledger, Pubkey::new_unique())
    }

    fn action(recipient: &Pubkey) -> TransferAction {
        TransferAction::new(recipient.to_address(), "0.01".parse().unwrap()).with_memo("order-7")
    }

    #[tokio::test]
    async fn test_metadata_is_returned_unchanged() {
        let (ledger, recipient) = setup();
        let responder = SolanaResponder::new(
            ResponderConfig::new(metadata(), action(&recipient)),
            Arc::new(AllowAll),
            ledger,
        )
        .unwrap();
        assert_eq!(responder.metadata().await.unwrap(), metadata());
        assert_eq!(responder.metadata().await.unwrap(), metadata());
    }

    #[tokio::test]
    async fn test_misconfigured_metadata_is_rejected() {
        let (ledger, recipient) = setup();
        let bad = TransactionMetadata {
            label: String::new(),
            icon: "https://example.com/icon.svg".parse().unwrap(),
        };
        let err = SolanaResponder::new(
            ResponderConfig::new(bad, action(&recipient)),
            Arc::new(AllowAll),
            ledger,
        )
        .unwrap_err();
        assert!(matches!(err, ResponderError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn test_transaction_is_paid_by_account_and_unsigned() {
        let (ledger, recipient) = setup();
        let responder = SolanaResponder::new(
            ResponderConfig::new(metadata(), action(&recipient)).with_message("Thanks!"),
            Arc::new(AllowAll),
            ledger,
        )
        .unwrap();
        let account = Pubkey::new_unique();
        let reference = Reference::random();
        let context = TransactionRequestContext::new(account.to_string())
            .with_references(vec![reference]);

        let response = responder.transaction(context).await.unwrap();
        assert_eq!(response.message.as_deref(), Some("Thanks!"));

        let tx = PartialTransaction::from_response(&response, &account).unwrap();
        assert_eq!(tx.required_signers(), &[account]);
        assert_eq!(tx.inner().signatures, vec![Signature::default()]);
        assert_eq!(tx.inner().message.recent_blockhash(), &Hash::new_from_array([5; 32]));

        let message = &tx.inner().message;
        let keys = message.static_account_keys();
        let ixs = message.instructions();
        assert_eq!(keys[usize::from(ixs[0].program_id_index)], MEMO_PROGRAM_PUBKEY);
        assert_eq!(keys[usize::from(ixs[1].program_id_index)], SYSTEM_PROGRAM_PUBKEY);
        assert_eq!(
            instructions::decode_system_transfer(&SYSTEM_PROGRAM_PUBKEY, &ixs[1].data),
            Some(10_000_000)
        );
        assert!(keys.contains(&reference.to_pubkey()));
    }

    #[tokio::test]
    async fn test_server_signer_fills_only_its_slot() {
        let (ledger, recipient) = setup();
        let server = Keypair::new();
        let server_pubkey = server.pubkey();
        let responder = SolanaResponder::new(
            ResponderConfig::new(metadata(), action(&recipient)).with_signer(server),
            Arc::new(AllowAll),
            ledger,
        )
        .unwrap();
        let account = Pubkey::new_unique();
        let response = responder
            .transaction(TransactionRequestContext::new(account.to_string()))
            .await
            .unwrap();

        let tx = PartialTransaction::from_response(&response, &account).unwrap();
        assert_eq!(tx.fee_payer(), Some(&account));
        assert_eq!(tx.required_signers(), &[account, server_pubkey]);
        assert!(tx.is_signed_by(&server_pubkey));
        assert!(!tx.is_signed_by(&account));
        assert!(!tx.is_fully_signed());
    }

    #[tokio::test]
    async fn test_server_signer_cannot_be_the_account() {
        let (ledger, recipient) = setup();
        let server = Keypair::new();
        let server_pubkey = server.pubkey();
        ledger.fund(server_pubkey, 1_000_000_000);
        let responder = SolanaResponder::new(
            ResponderConfig::new(metadata(), action(&recipient)).with_signer(server),
            Arc::new(AllowAll),
            ledger,
        )
        .unwrap();

        let err = responder
            .transaction(TransactionRequestContext::new(server_pubkey.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResponderError::InvalidAccount(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[tokio::test]
    async fn test_gate_decides_access() {
        let (ledger, recipient) = setup();
        let allowed = Pubkey::new_unique();
        let responder = SolanaResponder::new(
            ResponderConfig::new(metadata(), action(&recipient)),
            Arc::new(FnGate::new(move |account: &Pubkey| *account == allowed)),
            ledger,
        )
        .unwrap();

        let ok = responder
            .transaction(TransactionRequestContext::new(allowed.to_string()))
            .await;
        assert!(ok.is_ok());

        let denied = responder
            .transaction(TransactionRequestContext::new(Pubkey::new_unique().to_string()))
            .await
            .unwrap_err();
        assert!(matches!(denied, ResponderError::Forbidden));
    }

    #[tokio::test]
    async fn test_invalid_account_and_upstream_failures() {
        let (ledger, recipient) = setup();
        let responder = SolanaResponder::new(
            ResponderConfig::new(metadata(), action(&recipient)),
            Arc::new(AllowAll),
            Arc::clone(&ledger),
        )
        .unwrap();

        for account in ["", "not-an-address", "0OIl"] {
            let err = responder
                .transaction(TransactionRequestContext::new(account))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput, "{account:?}");
        }

        ledger.fail_with("connection reset");
        let err = responder
            .transaction(TransactionRequestContext::new(Pubkey::new_unique().to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(!err.public_message().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_spl_action_with_unknown_mint_is_internal() {
        let (ledger, recipient) = setup();
        let action = action(&recipient).with_spl_token(Pubkey::new_unique().to_address());
        let responder = SolanaResponder::new(
            ResponderConfig::new(metadata(), action),
            Arc::new(AllowAll),
            ledger,
        )
        .unwrap();
        let err = responder
            .transaction(TransactionRequestContext::new(Pubkey::new_unique().to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let (ledger, recipient) = setup();
        let responder: Arc<dyn Responder> = Arc::new(
            SolanaResponder::new(
                ResponderConfig::new(metadata(), action(&recipient)),
                Arc::new(AllowAll) as Arc<dyn GatePredicate>,
                ledger as Arc<dyn Ledger>,
            )
            .unwrap(),
        );
        assert_eq!(responder.metadata().await.unwrap().label, "Coffee Shop");
    }
}
