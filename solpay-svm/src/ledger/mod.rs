//! The ledger collaborator.
//!
//! Everything the protocol needs from a Solana node goes through the
//! [`Ledger`] trait: a recent blockhash, account lookups, the signature
//! history of an address, confirmed transactions, and token holdings. Two
//! implementations ship with the crate:
//!
//! - [`RpcLedger`] (feature `rpc`) talks to a JSON-RPC node
//! - [`InMemoryLedger`] keeps a deterministic ledger in process
//!
//! Implementations are shared behind `Arc` by concurrent requests and must not
//! serialize them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use solana_account::Account;
use solana_commitment_config::CommitmentConfig;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solpay::ErrorKind;

mod memory;
pub use memory::InMemoryLedger;

#[cfg(feature = "rpc")]
mod rpc;
#[cfg(feature = "rpc")]
pub use rpc::RpcLedger;

/// Failure talking to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The node could not be reached or returned an error.
    #[error("RPC error: {0}")]
    Rpc(String),
    /// The node answered with data that could not be decoded.
    #[error("undecodable ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Ledger failures are upstream failures.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Upstream
    }
}

/// Confirmation level a lookup is performed at.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    /// Voted on by a supermajority of the cluster.
    #[default]
    Confirmed,
    /// Rooted; cannot be rolled back.
    Finalized,
}

impl Finality {
    /// Returns the commitment level used for RPC queries.
    #[must_use]
    pub fn commitment(self) -> CommitmentConfig {
        match self {
            Self::Confirmed => CommitmentConfig::confirmed(),
            Self::Finalized => CommitmentConfig::finalized(),
        }
    }

    /// Returns the lowercase name of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Finality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Finality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown finality: {other}")),
        }
    }
}

/// A well-known Solana cluster or a custom RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cluster {
    /// The production cluster.
    MainnetBeta,
    /// The public development cluster.
    Devnet,
    /// The public test cluster.
    Testnet,
    /// A local test validator.
    Localnet,
    /// Any other RPC endpoint.
    Custom(String),
}

impl Cluster {
    /// Returns the JSON-RPC endpoint of the cluster.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        match self {
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
            Self::Localnet => "http://127.0.0.1:8899",
            Self::Custom(url) => url,
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MainnetBeta => f.write_str("mainnet-beta"),
            Self::Devnet => f.write_str("devnet"),
            Self::Testnet => f.write_str("testnet"),
            Self::Localnet => f.write_str("localnet"),
            Self::Custom(url) => f.write_str(url),
        }
    }
}

impl FromStr for Cluster {
    type Err = String;

    /// Parses a cluster moniker, or any `http(s)` URL as a custom endpoint.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet-beta" | "mainnet" => Ok(Self::MainnetBeta),
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            "localnet" | "localhost" => Ok(Self::Localnet),
            url if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(Self::Custom(url.to_owned()))
            }
            other => Err(format!("unknown cluster: {other}")),
        }
    }
}

/// One entry of an address's signature history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    /// First signature of the transaction.
    pub signature: Signature,
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Execution error, if the transaction failed.
    pub err: Option<String>,
    /// Estimated production time, as a Unix timestamp.
    pub block_time: Option<i64>,
}

/// Paging and confirmation parameters of a signature history query.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignatureQuery {
    /// Start searching backwards from this signature.
    pub before: Option<Signature>,
    /// Stop searching when this signature is reached.
    pub until: Option<Signature>,
    /// Maximum number of entries returned.
    pub limit: Option<usize>,
    /// Confirmation level of the returned entries.
    pub finality: Finality,
}

/// A token account held by an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHolding {
    /// Address of the token account.
    pub address: Pubkey,
    /// Mint of the held token.
    pub mint: Pubkey,
    /// Balance in base units.
    pub amount: u64,
}

/// Token balance of one account of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBalance {
    /// Index of the token account in the transaction's account keys.
    pub account_index: u8,
    /// Mint of the token.
    pub mint: Pubkey,
    /// Balance in base units.
    pub amount: u64,
    /// Decimals of the mint.
    pub decimals: u8,
}

/// Execution status and balance changes of a confirmed transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransactionMeta {
    /// Execution error, if the transaction failed.
    pub err: Option<String>,
    /// Lamport balances before execution, by account index.
    pub pre_balances: Vec<u64>,
    /// Lamport balances after execution, by account index.
    pub post_balances: Vec<u64>,
    /// Token balances before execution.
    pub pre_token_balances: Vec<TokenBalance>,
    /// Token balances after execution.
    pub post_token_balances: Vec<TokenBalance>,
}

/// A transaction included in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    /// Slot the transaction landed in.
    pub slot: u64,
    /// The transaction as submitted.
    pub transaction: VersionedTransaction,
    /// Execution results.
    pub meta: TransactionMeta,
}

impl ConfirmedTransaction {
    /// Returns the first signature, which identifies the transaction.
    #[must_use]
    pub fn signature(&self) -> Option<Signature> {
        self.transaction.signatures.first().copied()
    }

    /// Returns the statically listed account keys.
    #[must_use]
    pub fn account_keys(&self) -> &[Pubkey] {
        self.transaction.message.static_account_keys()
    }
}

/// Read access to a Solana ledger.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Returns a blockhash recent enough to build a transaction on.
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;

    /// Returns the account at `address`, or `None` if it does not exist.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError>;

    /// Returns the accounts at `addresses`, in order.
    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, LedgerError>;

    /// Returns the transactions mentioning `address`, newest first.
    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, LedgerError>;

    /// Returns the confirmed transaction with `signature`, if known.
    async fn get_transaction(
        &self,
        signature: &Signature,
        finality: Finality,
    ) -> Result<Option<ConfirmedTransaction>, LedgerError>;

    /// Returns the SPL token accounts owned by `owner`.
    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenHolding>, LedgerError>;
}

#[async_trait::async_trait]
impl<T: Ledger + ?Sized> Ledger for std::sync::Arc<T> {
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        (**self).latest_blockhash().await
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        (**self).get_account(address).await
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, LedgerError> {
        (**self).get_multiple_accounts(addresses).await
    }

    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        (**self).signatures_for_address(address, query).await
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
        finality: Finality,
    ) -> Result<Option<ConfirmedTransaction>, LedgerError> {
        (**self).get_transaction(signature, finality).await
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenHolding>, LedgerError> {
        (**self).token_accounts_by_owner(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_from_str() {
        assert_eq!("mainnet-beta".parse::<Cluster>().unwrap(), Cluster::MainnetBeta);
        assert_eq!("devnet".parse::<Cluster>().unwrap(), Cluster::Devnet);
        assert_eq!(
            "https://rpc.example.com".parse::<Cluster>().unwrap(),
            Cluster::Custom("https://rpc.example.com".into())
        );
        assert!("moon".parse::<Cluster>().is_err());
    }

    #[test]
    fn test_cluster_rpc_url() {
        assert_eq!(Cluster::Devnet.rpc_url(), "https://api.devnet.solana.com");
        assert_eq!(
            Cluster::Custom("http://node:8899".into()).rpc_url(),
            "http://node:8899"
        );
    }

    #[test]
    fn test_finality_commitment() {
        assert_eq!(Finality::Confirmed.commitment(), CommitmentConfig::confirmed());
        assert_eq!(Finality::Finalized.commitment(), CommitmentConfig::finalized());
        assert_eq!("finalized".parse::<Finality>().unwrap(), Finality::Finalized);
        assert_eq!(Finality::default(), Finality::Confirmed);
    }
}
