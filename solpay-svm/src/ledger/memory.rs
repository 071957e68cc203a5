//! In-process ledger.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use solana_account::Account;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

use super::{
    ConfirmedTransaction, Finality, Ledger, LedgerError, SignatureInfo, SignatureQuery,
    TokenHolding, TransactionMeta,
};
use crate::instructions::SYSTEM_PROGRAM_PUBKEY;
use crate::metadata::{self, TokenMetadata};
use crate::token::{self, TokenAccount};

#[derive(Debug, Default)]
struct State {
    blockhash: Hash,
    slot: u64,
    accounts: HashMap<Pubkey, Account>,
    transactions: Vec<ConfirmedTransaction>,
    failure: Option<String>,
}

/// A deterministic ledger held in memory.
///
/// Transactions are recorded in order and treated as confirmed at every
/// finality. A failure can be injected with [`InMemoryLedger::fail_with`] to
/// make every subsequent query return [`LedgerError::Rpc`].
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<State>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<RwLockReadGuard<'_, State>, LedgerError> {
        let state = self.read();
        match &state.failure {
            Some(message) => Err(LedgerError::Rpc(message.clone())),
            None => Ok(state),
        }
    }

    /// Sets the blockhash returned by [`Ledger::latest_blockhash`].
    pub fn set_blockhash(&self, blockhash: Hash) {
        self.write().blockhash = blockhash;
    }

    /// Stores an account.
    pub fn set_account(&self, address: Pubkey, account: Account) {
        self.write().accounts.insert(address, account);
    }

    /// Stores a System-owned account holding `lamports`.
    pub fn fund(&self, address: Pubkey, lamports: u64) {
        self.set_account(
            address,
            Account {
                lamports,
                data: Vec::new(),
                owner: SYSTEM_PROGRAM_PUBKEY,
                executable: false,
                rent_epoch: 0,
            },
        );
    }

    /// Stores a mint owned by `token_program`.
    pub fn add_mint(&self, mint: Pubkey, decimals: u8, token_program: &Pubkey) {
        self.set_account(mint, token::mint_account(decimals, token_program, 1_461_600));
    }

    /// Stores the associated token account of `owner` for `mint` and returns
    /// its address.
    pub fn add_token_account(
        &self,
        owner: Pubkey,
        mint: Pubkey,
        amount: u64,
        token_program: &Pubkey,
    ) -> Pubkey {
        let address = token::associated_token_address(&owner, &mint, token_program);
        let state = TokenAccount {
            mint,
            owner,
            amount,
            frozen: false,
        };
        self.set_account(address, token::token_account(&state, token_program, 2_039_280));
        address
    }

    /// Stores the metadata account of `metadata.mint` and returns its
    /// address.
    ///
    /// # Errors
    ///
    /// Returns the encoder's error if the metadata cannot be serialized.
    pub fn set_metadata(&self, metadata: &TokenMetadata) -> std::io::Result<Pubkey> {
        let address = metadata::metadata_address(&metadata.mint);
        self.set_account(
            address,
            Account {
                lamports: 5_616_720,
                data: metadata.to_account_data()?,
                owner: metadata::TOKEN_METADATA_PROGRAM_PUBKEY,
                executable: false,
                rent_epoch: 0,
            },
        );
        Ok(address)
    }

    /// Records a transaction in the next slot and returns its signature.
    pub fn record_transaction(
        &self,
        transaction: VersionedTransaction,
        meta: TransactionMeta,
    ) -> Signature {
        let mut state = self.write();
        state.slot += 1;
        let confirmed = ConfirmedTransaction {
            slot: state.slot,
            transaction,
            meta,
        };
        let signature = confirmed.signature().unwrap_or_default();
        state.transactions.push(confirmed);
        signature
    }

    /// Makes every subsequent query fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.write().failure = Some(message.into());
    }

    /// Clears an injected failure.
    pub fn recover(&self) {
        self.write().failure = None;
    }
}

#[async_trait::async_trait]
impl Ledger for InMemoryLedger {
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        Ok(self.check()?.blockhash)
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        Ok(self.check()?.accounts.get(address).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, LedgerError> {
        let state = self.check()?;
        Ok(addresses
            .iter()
            .map(|address| state.accounts.get(address).cloned())
            .collect())
    }

    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        let state = self.check()?;
        let newest_first = state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.account_keys().contains(address))
            .filter_map(|tx| {
                tx.signature().map(|signature| SignatureInfo {
                    signature,
                    slot: tx.slot,
                    err: tx.meta.err.clone(),
                    block_time: None,
                })
            });
        let mut seen_before = query.before.is_none();
        let mut page = Vec::new();
        for info in newest_first {
            if !seen_before {
                seen_before = Some(info.signature) == query.before;
                continue;
            }
            if Some(info.signature) == query.until {
                break;
            }
            if query.limit.is_some_and(|limit| page.len() >= limit) {
                break;
            }
            page.push(info);
        }
        Ok(page)
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
        _finality: Finality,
    ) -> Result<Option<ConfirmedTransaction>, LedgerError> {
        let state = self.check()?;
        Ok(state
            .transactions
            .iter()
            .find(|tx| tx.signature().as_ref() == Some(signature))
            .cloned())
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenHolding>, LedgerError> {
        let state = self.check()?;
        let mut holdings: Vec<TokenHolding> = state
            .accounts
            .iter()
            .filter(|(_, account)| token::is_token_program(&account.owner))
            .filter_map(|(address, account)| {
                let token = TokenAccount::from_account(account)?;
                (token.owner == *owner).then_some(TokenHolding {
                    address: *address,
                    mint: token.mint,
                    amount: token.amount,
                })
            })
            .collect();
        holdings.sort_by_key(|holding| holding.address);
        Ok(holdings)
    }
}
