//! JSON-RPC backed ledger.

use std::str::FromStr;
use std::sync::Arc;

use solana_account::Account;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_client::rpc_request::{RpcRequest, TokenAccountsFilter};
use solana_client::rpc_response::RpcKeyedAccount;
use solana_commitment_config::CommitmentConfig;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction_status_client_types::{
    EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding, UiTransactionTokenBalance,
};

use super::{
    ConfirmedTransaction, Finality, Ledger, LedgerError, SignatureInfo, SignatureQuery,
    TokenBalance, TokenHolding, TransactionMeta,
};

// getMultipleAccounts accepts at most this many keys per call.
const MAX_MULTIPLE_ACCOUNTS: usize = 100;

/// A [`Ledger`] backed by a Solana JSON-RPC node.
///
/// Cheap to clone; clones share one HTTP connection pool.
#[derive(Clone)]
pub struct RpcLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("url", &self.client.url())
            .field("commitment", &self.commitment)
            .finish()
    }
}

impl RpcLedger {
    /// Connects to `url` with `confirmed` commitment for account reads.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_commitment(url, CommitmentConfig::confirmed())
    }

    /// Connects to `url` with the given commitment for account reads.
    #[must_use]
    pub fn with_commitment(url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(url.into(), commitment)),
            commitment,
        }
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: Arc<RpcClient>) -> Self {
        let commitment = client.commitment();
        Self { client, commitment }
    }

    /// Returns the underlying client.
    #[must_use]
    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    async fn holdings_of(
        &self,
        owner: &Pubkey,
        program: Pubkey,
    ) -> Result<Vec<TokenHolding>, LedgerError> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(program))
            .await
            .map_err(rpc_error)?;
        accounts.iter().map(parse_keyed_account).collect()
    }
}

fn rpc_error(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Rpc(e.to_string())
}

fn parse_keyed_account(keyed: &RpcKeyedAccount) -> Result<TokenHolding, LedgerError> {
    let address = Pubkey::from_str(&keyed.pubkey)
        .map_err(|e| LedgerError::Decode(format!("token account {}: {e}", keyed.pubkey)))?;
    let value = serde_json::to_value(&keyed.account)
        .map_err(|e| LedgerError::Decode(format!("token account {address}: {e}")))?;
    let info = &value["data"]["parsed"]["info"];
    let mint = info["mint"]
        .as_str()
        .and_then(|mint| Pubkey::from_str(mint).ok())
        .ok_or_else(|| LedgerError::Decode(format!("token account {address}: missing mint")))?;
    let amount = info["tokenAmount"]["amount"]
        .as_str()
        .and_then(|amount| amount.parse::<u64>().ok())
        .ok_or_else(|| LedgerError::Decode(format!("token account {address}: missing amount")))?;
    Ok(TokenHolding {
        address,
        mint,
        amount,
    })
}

fn token_balance(balance: UiTransactionTokenBalance) -> Result<TokenBalance, LedgerError> {
    let mint = Pubkey::from_str(&balance.mint)
        .map_err(|e| LedgerError::Decode(format!("token balance mint: {e}")))?;
    let amount = balance
        .ui_token_amount
        .amount
        .parse::<u64>()
        .map_err(|e| LedgerError::Decode(format!("token balance amount: {e}")))?;
    Ok(TokenBalance {
        account_index: balance.account_index,
        mint,
        amount,
        decimals: balance.ui_token_amount.decimals,
    })
}

fn token_balances(
    balances: Option<Vec<UiTransactionTokenBalance>>,
) -> Result<Vec<TokenBalance>, LedgerError> {
    balances
        .unwrap_or_default()
        .into_iter()
        .map(token_balance)
        .collect()
}

fn confirmed_transaction(
    encoded: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<ConfirmedTransaction, LedgerError> {
    let transaction = encoded
        .transaction
        .transaction
        .decode()
        .ok_or_else(|| LedgerError::Decode("undecodable transaction".to_owned()))?;
    let meta = encoded
        .transaction
        .meta
        .ok_or_else(|| LedgerError::Decode("transaction without status meta".to_owned()))?;
    Ok(ConfirmedTransaction {
        slot: encoded.slot,
        transaction,
        meta: TransactionMeta {
            err: meta.err.map(|e| format!("{e:?}")),
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            pre_token_balances: token_balances(meta.pre_token_balances.into())?,
            post_token_balances: token_balances(meta.post_token_balances.into())?,
        },
    })
}

#[async_trait::async_trait]
impl Ledger for RpcLedger {
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.client.get_latest_blockhash().await.map_err(rpc_error)
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, LedgerError> {
        self.client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map(|response| response.value)
            .map_err(rpc_error)
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, LedgerError> {
        let mut accounts = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let response = self
                .client
                .get_multiple_accounts_with_commitment(chunk, self.commitment)
                .await
                .map_err(rpc_error)?;
            accounts.extend(response.value);
        }
        Ok(accounts)
    }

    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>, LedgerError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: query.before,
            until: query.until,
            limit: query.limit,
            commitment: Some(query.finality.commitment()),
        };
        let statuses = self
            .client
            .get_signatures_for_address_with_config(address, config)
            .await
            .map_err(rpc_error)?;
        statuses
            .into_iter()
            .map(|status| {
                let signature = Signature::from_str(&status.signature).map_err(|e| {
                    LedgerError::Decode(format!("signature {}: {e}", status.signature))
                })?;
                Ok(SignatureInfo {
                    signature,
                    slot: status.slot,
                    err: status.err.map(|e| format!("{e:?}")),
                    block_time: status.block_time,
                })
            })
            .collect()
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
        finality: Finality,
    ) -> Result<Option<ConfirmedTransaction>, LedgerError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(finality.commitment()),
            max_supported_transaction_version: Some(0),
        };
        // `getTransaction` answers `null` for unknown signatures.
        let encoded: Option<EncodedConfirmedTransactionWithStatusMeta> = self
            .client
            .send(
                RpcRequest::GetTransaction,
                serde_json::json!([signature.to_string(), config]),
            )
            .await
            .map_err(rpc_error)?;
        encoded.map(confirmed_transaction).transpose()
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenHolding>, LedgerError> {
        let mut holdings = self.holdings_of(owner, spl_token::id()).await?;
        holdings.extend(self.holdings_of(owner, spl_token_2022::id()).await?);
        Ok(holdings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_keyed_account_reads_parsed_info() {
        let mint = Pubkey::new_unique();
        let address = Pubkey::new_unique();
        let keyed: RpcKeyedAccount = serde_json::from_value(json!({
            "pubkey": address.to_string(),
            "account": {
                "lamports": 2039280,
                "owner": spl_token::id().to_string(),
                "executable": false,
                "rentEpoch": 0,
                "space": 165,
                "data": {
                    "program": "spl-token",
                    "space": 165,
                    "parsed": {
                        "type": "account",
                        "info": {
                            "mint": mint.to_string(),
                            "owner": Pubkey::new_unique().to_string(),
                            "state": "initialized",
                            "isNative": false,
                            "tokenAmount": {
                                "amount": "1",
                                "decimals": 0,
                                "uiAmount": 1.0,
                                "uiAmountString": "1"
                            }
                        }
                    }
                }
            }
        }))
        .unwrap();
        let holding = parse_keyed_account(&keyed).unwrap();
        assert_eq!(
            holding,
            TokenHolding {
                address,
                mint,
                amount: 1
            }
        );
    }

    #[test]
    fn test_debug_shows_endpoint() {
        let ledger = RpcLedger::new("http://127.0.0.1:8899");
        assert!(format!("{ledger:?}").contains("127.0.0.1:8899"));
    }
}
