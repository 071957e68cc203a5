//! Predicates deciding whether an account may request a transaction.
//!
//! A [`GatePredicate`] runs before any transaction is built. Rejection is
//! reported as `Forbidden`; a ledger failure while evaluating is reported as
//! an upstream failure, never as a rejection.

use std::fmt;
use std::sync::Arc;

use solana_pubkey::Pubkey;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::ledger::{Ledger, LedgerError};
use crate::metadata::{self, TokenMetadata};

/// Decides whether `account` may receive a transaction.
#[async_trait::async_trait]
pub trait GatePredicate: Send + Sync {
    /// Returns `Ok(true)` if the account is allowed.
    async fn allows(&self, account: &Pubkey) -> Result<bool, LedgerError>;
}

#[async_trait::async_trait]
impl<T: GatePredicate + ?Sized> GatePredicate for Arc<T> {
    async fn allows(&self, account: &Pubkey) -> Result<bool, LedgerError> {
        (**self).allows(account).await
    }
}

/// Allows every account.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait::async_trait]
impl GatePredicate for AllowAll {
    async fn allows(&self, _account: &Pubkey) -> Result<bool, LedgerError> {
        Ok(true)
    }
}

/// A synchronous custom rule.
pub struct FnGate<F> {
    rule: F,
}

impl<F> FnGate<F>
where
    F: Fn(&Pubkey) -> bool + Send + Sync,
{
    /// Wraps `rule`.
    pub const fn new(rule: F) -> Self {
        Self { rule }
    }
}

impl<F> fmt::Debug for FnGate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGate").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<F> GatePredicate for FnGate<F>
where
    F: Fn(&Pubkey) -> bool + Send + Sync,
{
    async fn allows(&self, account: &Pubkey) -> Result<bool, LedgerError> {
        Ok((self.rule)(account))
    }
}

// getMultipleAccounts accepts at most this many keys per call.
const METADATA_BATCH: usize = 100;

/// Allows accounts holding, with a positive balance, a token that is a
/// verified member of a Metaplex collection.
#[derive(Debug)]
pub struct CollectionGate<L: ?Sized> {
    collection: Pubkey,
    ledger: Arc<L>,
}

impl<L: Ledger + ?Sized> CollectionGate<L> {
    /// Creates a gate for the collection whose NFT mint is `collection`.
    pub const fn new(collection: Pubkey, ledger: Arc<L>) -> Self {
        Self { collection, ledger }
    }

    /// Returns the collection mint.
    pub const fn collection(&self) -> &Pubkey {
        &self.collection
    }
}

#[async_trait::async_trait]
impl<L: Ledger + ?Sized> GatePredicate for CollectionGate<L> {
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "solpay.gate.collection", skip_all, fields(account = %account), err)
    )]
    async fn allows(&self, account: &Pubkey) -> Result<bool, LedgerError> {
        let holdings = self.ledger.token_accounts_by_owner(account).await?;
        let metadata_addresses: Vec<Pubkey> = holdings
            .iter()
            .filter(|holding| holding.amount > 0)
            .map(|holding| metadata::metadata_address(&holding.mint))
            .collect();
        for batch in metadata_addresses.chunks(METADATA_BATCH) {
            let accounts = self.ledger.get_multiple_accounts(batch).await?;
            let member = accounts
                .iter()
                .flatten()
                .filter(|account| account.owner == metadata::TOKEN_METADATA_PROGRAM_PUBKEY)
                .filter_map(|account| TokenMetadata::parse(&account.data))
                .any(|metadata| metadata.in_verified_collection(&self.collection));
            if member {
                return Ok(true);
            }
        }
        #[cfg(feature = "telemetry")]
        tracing::debug!(collection = %self.collection, "account holds no verified member");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::metadata::Collection;

    fn holder_of(
        ledger: &InMemoryLedger,
        collection: Option<Collection>,
        amount: u64,
    ) -> Pubkey {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        ledger.add_mint(mint, 0, &spl_token::id());
        ledger.add_token_account(owner, mint, amount, &spl_token::id());
        ledger
            .set_metadata(&TokenMetadata {
                update_authority: Pubkey::new_unique(),
                mint,
                name: "Member".into(),
                symbol: "MBR".into(),
                uri: String::new(),
                collection,
            })
            .unwrap();
        owner
    }

    #[tokio::test]
    async fn test_collection_gate() {
        let ledger = Arc::new(InMemoryLedger::new());
        let collection = Pubkey::new_unique();
        let verified = Some(Collection {
            verified: true,
            key: collection,
        });
        let gate = CollectionGate::new(collection, Arc::clone(&ledger));

        let holder = holder_of(&ledger, verified, 1);
        assert!(gate.allows(&holder).await.unwrap());

        let stranger = Pubkey::new_unique();
        assert!(!gate.allows(&stranger).await.unwrap());

        let sold = holder_of(&ledger, verified, 0);
        assert!(!gate.allows(&sold).await.unwrap());

        let unverified = holder_of(
            &ledger,
            Some(Collection {
                verified: false,
                key: collection,
            }),
            1,
        );
        assert!(!gate.allows(&unverified).await.unwrap());

        let other = holder_of(
            &ledger,
            Some(Collection {
                verified: true,
                key: Pubkey::new_unique(),
            }),
            1,
        );
        assert!(!gate.allows(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_collection_gate_surfaces_ledger_failure() {
        let ledger = Arc::new(InMemoryLedger::new());
        let gate = CollectionGate::new(Pubkey::new_unique(), Arc::clone(&ledger));
        ledger.fail_with("timeout");
        let err = gate.allows(&Pubkey::new_unique()).await.unwrap_err();
        assert_eq!(err, LedgerError::Rpc("timeout".into()));
    }

    #[tokio::test]
    async fn test_fn_gate_and_allow_all() {
        let blocked = Pubkey::new_unique();
        let gate = FnGate::new(move |account: &Pubkey| *account != blocked);
        assert!(!gate.allows(&blocked).await.unwrap());
        assert!(gate.allows(&Pubkey::new_unique()).await.unwrap());
        assert!(AllowAll.allows(&blocked).await.unwrap());
    }
}
