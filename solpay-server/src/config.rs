//! Server configuration.
//!
//! Loaded once at start from a TOML file. String values may reference the
//! environment with `$VAR` or `${VAR}`; unresolved references are left as-is.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 3000
//! cluster = "devnet"
//! path = "/pay"
//! public_url = "https://shop.example/pay"
//! label = "Coffee Shop"
//! icon = "https://shop.example/icon.svg"
//! message = "Thanks for your order"
//! signer_keypair = "$SERVER_KEYPAIR"
//!
//! [transfer]
//! recipient = "mvines9iiHiQTysrwkJjGf2gb9Ex9jXJX8ns3qwf2kN"
//! amount = "0.01"
//! memo = "order"
//!
//! [gate]
//! collection = "J1S9H3QjnRtBbbuD4HjPV6RpRhwuk4zKbxsnCHuTgh9w"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the configuration file (default: `config.toml`)
//! - `HOST` - Overrides `host`
//! - `PORT` - Overrides `port`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use solana_keypair::Keypair;
use solpay::proto::{MetadataError, TransactionMetadata};
use solpay::{Address, Amount, Reference, TransactionRequest, TransferRequest};
use solpay_svm::TransferAction;
use solpay_svm::ledger::{Cluster, Finality};
use url::Url;

/// Failure loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: String,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// `signer_keypair` is neither base58 nor a JSON byte array of a keypair.
    #[error("invalid signer_keypair: {0}")]
    Keypair(String),
    /// `label` or `icon` is unusable.
    #[error("invalid endpoint metadata: {0}")]
    Metadata(#[from] MetadataError),
    /// `public_url` is missing or not http(s).
    #[error("public_url must be an absolute http(s) URL of the endpoint")]
    PublicUrl,
    /// `path` cannot be routed.
    #[error("invalid path {path:?}: {reason}")]
    Path {
        /// The configured path.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Route served next to the endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Top-level configuration.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Bind port (default: `3000`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON-RPC endpoint. Takes precedence over `cluster`.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Cluster moniker or URL used when `rpc_url` is absent (default: `devnet`).
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub cluster: Option<Cluster>,

    /// Confirmation level used when watching for payments.
    #[serde(default)]
    pub finality: Finality,

    /// Route of the transaction-request endpoint (default: `/pay`).
    #[serde(default = "default_path")]
    pub path: String,

    /// Public URL wallets reach the endpoint at. Needed by `link`.
    #[serde(default)]
    pub public_url: Option<Url>,

    /// Returned by `GET`.
    pub label: String,

    /// Returned by `GET`.
    pub icon: Url,

    /// Returned alongside every transaction.
    #[serde(default)]
    pub message: Option<String>,

    /// Co-signer of every transaction, base58 or a JSON array of 64 bytes.
    #[serde(default)]
    pub signer_keypair: Option<String>,

    /// The transfer every transaction performs.
    pub transfer: TransferConfig,

    /// Restricts who may request a transaction.
    #[serde(default)]
    pub gate: Option<GateConfig>,
}

/// The `[transfer]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Wallet receiving the transfer.
    pub recipient: Address,
    /// Amount in SOL, or in whole tokens when `spl_token` is set.
    pub amount: Amount,
    /// Mint of the SPL token. Native SOL when absent.
    #[serde(default)]
    pub spl_token: Option<Address>,
    /// References embedded in every transaction.
    #[serde(default)]
    pub references: Vec<Reference>,
    /// Memo recorded with the transfer.
    #[serde(default)]
    pub memo: Option<String>,
}

/// The `[gate]` table.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GateConfig {
    /// Collection NFT mint whose verified members are allowed.
    pub collection: Address,
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3000
}

fn default_path() -> String {
    "/pay".to_owned()
}

impl ServerConfig {
    /// Loads the configuration at `path`, expands environment references and
    /// applies `HOST` / `PORT` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;

        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        Ok(config)
    }

    /// Parses configuration text after environment expansion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or missing keys, and
    /// [`ConfigError::Path`] if `path` cannot be routed.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        config.check_path()?;
        Ok(config)
    }

    /// Checks that `path` is a static route distinct from `/health`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Path`] describing the first problem found.
    pub fn check_path(&self) -> Result<(), ConfigError> {
        let reason = if !self.path.starts_with('/') {
            Some("must start with '/'")
        } else if self.path == HEALTH_PATH {
            Some("reserved for the health check")
        } else if self.path.contains(['{', '}']) {
            Some("must not contain route parameters")
        } else if self
            .path
            .split('/')
            .any(|segment| segment.starts_with([':', '*']))
        {
            Some("segments must not start with ':' or '*'")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ConfigError::Path {
                path: self.path.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Returns the socket address to bind.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns the JSON-RPC endpoint to use.
    #[must_use]
    pub fn rpc_endpoint(&self) -> String {
        match (&self.rpc_url, &self.cluster) {
            (Some(url), _) => url.clone(),
            (None, Some(cluster)) => cluster.rpc_url().to_owned(),
            (None, None) => Cluster::Devnet.rpc_url().to_owned(),
        }
    }

    /// Returns the validated endpoint metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Metadata`] if `label` or `icon` is unusable.
    pub fn metadata(&self) -> Result<TransactionMetadata, ConfigError> {
        Ok(TransactionMetadata::new(self.label.clone(), self.icon.clone())?)
    }

    /// Returns the configured transfer.
    #[must_use]
    pub fn action(&self) -> TransferAction {
        let t = &self.transfer;
        let mut action = TransferAction::new(t.recipient, t.amount);
        action.spl_token = t.spl_token;
        action.references.clone_from(&t.references);
        action.memo.clone_from(&t.memo);
        action
    }

    /// Decodes `signer_keypair`.
    ///
    /// Returns `Ok(None)` when the key is absent or still an unresolved
    /// `$VAR` reference.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Keypair`] if the value is not a keypair.
    pub fn signer(&self) -> Result<Option<Keypair>, ConfigError> {
        let Some(raw) = self.signer_keypair.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() || raw.starts_with('$') {
            tracing::warn!("signer_keypair not resolved (missing env var?), running without signer");
            return Ok(None);
        }
        let bytes = if raw.starts_with('[') {
            serde_json::from_str::<Vec<u8>>(raw).map_err(|e| ConfigError::Keypair(e.to_string()))?
        } else {
            bs58::decode(raw)
                .into_vec()
                .map_err(|e| ConfigError::Keypair(e.to_string()))?
        };
        Keypair::try_from(bytes.as_slice())
            .map(Some)
            .map_err(|e| ConfigError::Keypair(e.to_string()))
    }

    /// Returns a transaction-request link to the endpoint carrying
    /// `reference` in its query string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PublicUrl`] if `public_url` is missing or not
    /// http(s).
    pub fn transaction_link(&self, reference: &Reference) -> Result<TransactionRequest, ConfigError> {
        let mut link = self.public_url.clone().ok_or(ConfigError::PublicUrl)?;
        link.query_pairs_mut()
            .append_pair("reference", &reference.to_string());
        TransactionRequest::new(link).map_err(|_| ConfigError::PublicUrl)
    }

    /// Returns the non-interactive transfer request equivalent to the
    /// configured transfer, with `reference` added.
    #[must_use]
    pub fn transfer_request(&self, reference: Option<Reference>) -> TransferRequest {
        let t = &self.transfer;
        let mut request = TransferRequest::new(t.recipient)
            .with_amount(t.amount)
            .with_label(self.label.clone());
        request.spl_token = t.spl_token;
        request.references.clone_from(&t.references);
        request.references.extend(reference);
        request.message.clone_from(&self.message);
        request.memo.clone_from(&t.memo);
        request
    }
}

/// Expands `$VAR` and `${VAR}` from the process environment.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() && (closed || !braced) => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
