//! `solana:` URL encoder and decoder.
//!
//! Two request forms share the scheme:
//!
//! ```text
//! solana:<recipient>?amount=<amount>&spl-token=<mint>&reference=<ref>&label=<label>&message=<message>&memo=<memo>
//! solana:<link>
//! ```
//!
//! Binary fields are base58, free text is percent-encoded like JavaScript's
//! `encodeURIComponent` (a space becomes `%20`). A path containing `:` or `%`
//! is a transaction-request link; anything else is a transfer recipient.
//!
//! # Example
//!
//! ```rust
//! use solpay::url::{RequestUrl, TransferRequest};
//!
//! let recipient = "mvines9iiHiQTysrwkJjGf2gb9Ex9jXJX8ns3qwf2kN".parse().unwrap();
//! let request = TransferRequest::new(recipient)
//!     .with_amount("1".parse().unwrap())
//!     .with_label("Michael");
//! let url = request.to_string();
//! assert_eq!(url, "solana:mvines9iiHiQTysrwkJjGf2gb9Ex9jXJX8ns3qwf2kN?amount=1&label=Michael");
//! assert_eq!(url.parse::<RequestUrl>().unwrap(), RequestUrl::Transfer(request));
//! ```

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::address::{Address, AddressError, Reference};
use crate::amount::{Amount, AmountError};
use crate::error::ErrorKind;

/// The URL scheme of the protocol.
pub const SOLANA_SCHEME: &str = "solana";

/// Longest URL accepted by the decoder.
pub const MAX_URL_LENGTH: usize = 2048;

/// Characters left unescaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const PARAM_AMOUNT: &str = "amount";
const PARAM_SPL_TOKEN: &str = "spl-token";
const PARAM_REFERENCE: &str = "reference";
const PARAM_LABEL: &str = "label";
const PARAM_MESSAGE: &str = "message";
const PARAM_MEMO: &str = "memo";

/// Reasons a `solana:` URL cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseUrlError {
    /// The URL exceeds [`MAX_URL_LENGTH`].
    #[error("URL is {0} characters long, at most {MAX_URL_LENGTH} allowed")]
    TooLong(usize),
    /// The URL does not start with the expected scheme.
    #[error("expected scheme {expected:?}")]
    InvalidScheme {
        /// The scheme the decoder was configured with.
        expected: String,
    },
    /// The URL carries no recipient or link.
    #[error("recipient missing")]
    MissingRecipient,
    /// The recipient is not a valid address.
    #[error("recipient invalid: {0}")]
    InvalidRecipient(AddressError),
    /// The `amount` parameter is negative, non-numeric or malformed.
    #[error("amount invalid: {0}")]
    InvalidAmount(AmountError),
    /// The `spl-token` parameter is not a valid address.
    #[error("spl-token invalid: {0}")]
    InvalidSplToken(AddressError),
    /// A `reference` parameter is not a valid address.
    #[error("reference invalid: {0}")]
    InvalidReference(AddressError),
    /// The transaction-request link is not percent-decodable UTF-8.
    #[error("link is not valid percent-encoded UTF-8")]
    InvalidEncoding,
    /// The transaction-request link is not an absolute URL.
    #[error("link invalid: {0}")]
    InvalidLink(String),
    /// The transaction-request link is not served over http(s).
    #[error("link must use http or https, got {0:?}")]
    UnsupportedLinkScheme(String),
    /// A transaction request carried inline parameters.
    #[error("transaction request links accept no inline parameters")]
    InlineParameters,
}

impl ParseUrlError {
    /// Every decoding failure is malformed input.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedInput
    }
}

/// A non-interactive request to transfer SOL or an SPL token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Account receiving the transfer (the wallet owner, not a token account).
    pub recipient: Address,
    /// Amount in whole SOL or whole tokens. The wallet prompts when absent.
    pub amount: Option<Amount>,
    /// Mint of the SPL token to transfer. Native SOL when absent.
    pub spl_token: Option<Address>,
    /// References to embed in the transfer, in order.
    pub references: Vec<Reference>,
    /// Source of the request, e.g. the merchant name.
    pub label: Option<String>,
    /// Description of the request, e.g. the item purchased.
    pub message: Option<String>,
    /// Memo recorded on-chain with the transfer.
    pub memo: Option<String>,
}

impl TransferRequest {
    /// Creates a request carrying only the recipient.
    #[must_use]
    pub const fn new(recipient: Address) -> Self {
        Self {
            recipient,
            amount: None,
            spl_token: None,
            references: Vec::new(),
            label: None,
            message: None,
            memo: None,
        }
    }

    /// Sets the amount.
    #[must_use]
    pub const fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Sets the SPL token mint.
    #[must_use]
    pub const fn with_spl_token(mut self, mint: Address) -> Self {
        self.spl_token = Some(mint);
        self
    }

    /// Appends a reference.
    #[must_use]
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Encodes the request under the given scheme.
    #[must_use]
    pub fn encode_with_scheme(&self, scheme: &str) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(amount) = &self.amount {
            params.push((PARAM_AMOUNT, amount.to_string()));
        }
        if let Some(mint) = &self.spl_token {
            params.push((PARAM_SPL_TOKEN, mint.to_string()));
        }
        for reference in &self.references {
            params.push((PARAM_REFERENCE, reference.to_string()));
        }
        if let Some(label) = &self.label {
            params.push((PARAM_LABEL, encode_component(label)));
        }
        if let Some(message) = &self.message {
            params.push((PARAM_MESSAGE, encode_component(message)));
        }
        if let Some(memo) = &self.memo {
            params.push((PARAM_MEMO, encode_component(memo)));
        }

        let mut url = format!("{scheme}:{}", self.recipient);
        for (i, (key, value)) in params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    fn decode(path: &str, query: Option<&str>) -> Result<Self, ParseUrlError> {
        let recipient = Address::from_str(path).map_err(ParseUrlError::InvalidRecipient)?;
        let mut request = Self::new(recipient);

        let Some(query) = query else {
            return Ok(request);
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                PARAM_AMOUNT if request.amount.is_none() => {
                    let amount = value.parse::<Amount>().map_err(ParseUrlError::InvalidAmount)?;
                    request.amount = Some(amount);
                }
                PARAM_SPL_TOKEN if request.spl_token.is_none() => {
                    let mint = value.parse::<Address>().map_err(ParseUrlError::InvalidSplToken)?;
                    request.spl_token = Some(mint);
                }
                PARAM_REFERENCE => {
                    let reference = value.parse::<Reference>().map_err(ParseUrlError::InvalidReference)?;
                    request.references.push(reference);
                }
                PARAM_LABEL if request.label.is_none() => {
                    request.label = Some(value.into_owned());
                }
                PARAM_MESSAGE if request.message.is_none() => {
                    request.message = Some(value.into_owned());
                }
                PARAM_MEMO if request.memo.is_none() => {
                    request.memo = Some(value.into_owned());
                }
                _ => {}
            }
        }
        Ok(request)
    }
}

impl fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode_with_scheme(SOLANA_SCHEME))
    }
}

/// A link to an endpoint that builds an arbitrary transaction on request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Absolute http(s) URL of the endpoint.
    pub link: Url,
}

impl TransactionRequest {
    /// Creates a transaction request for an absolute http(s) link.
    ///
    /// # Errors
    ///
    /// Returns [`ParseUrlError::UnsupportedLinkScheme`] for non-http(s) links.
    pub fn new(link: Url) -> Result<Self, ParseUrlError> {
        if !matches!(link.scheme(), "http" | "https") {
            return Err(ParseUrlError::UnsupportedLinkScheme(link.scheme().to_owned()));
        }
        Ok(Self { link })
    }

    /// Encodes the request under the given scheme.
    ///
    /// Links with their own query string, fragment or escapes are
    /// percent-encoded as a single component so that decoding restores them
    /// exactly; plain links are written as-is.
    #[must_use]
    pub fn encode_with_scheme(&self, scheme: &str) -> String {
        let link = self.link.as_str();
        if link.contains(['?', '#', '%']) {
            format!("{scheme}:{}", encode_component(link))
        } else {
            format!("{scheme}:{link}")
        }
    }

    fn decode(path: &str, query: Option<&str>) -> Result<Self, ParseUrlError> {
        if query.is_some_and(|q| !q.is_empty()) {
            return Err(ParseUrlError::InlineParameters);
        }
        let decoded = percent_decode_str(path)
            .decode_utf8()
            .map_err(|_| ParseUrlError::InvalidEncoding)?;
        let link = Url::parse(&decoded).map_err(|e| ParseUrlError::InvalidLink(e.to_string()))?;
        Self::new(link)
    }
}

impl fmt::Display for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode_with_scheme(SOLANA_SCHEME))
    }
}

/// A decoded `solana:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestUrl {
    /// `solana:<recipient>?<params>`
    Transfer(TransferRequest),
    /// `solana:<link>`
    Transaction(TransactionRequest),
}

impl RequestUrl {
    /// Decodes a URL using the `solana` scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ParseUrlError`] if the URL is malformed.
    pub fn parse(input: &str) -> Result<Self, ParseUrlError> {
        Self::parse_with_scheme(input, SOLANA_SCHEME)
    }

    /// Decodes a URL using a custom scheme.
    ///
    /// # Errors
    ///
    /// Returns [`ParseUrlError`] if the URL is malformed.
    pub fn parse_with_scheme(input: &str, scheme: &str) -> Result<Self, ParseUrlError> {
        if input.len() > MAX_URL_LENGTH {
            return Err(ParseUrlError::TooLong(input.len()));
        }
        let rest = input
            .split_once(':')
            .filter(|(s, _)| s.eq_ignore_ascii_case(scheme))
            .map(|(_, rest)| rest)
            .ok_or_else(|| ParseUrlError::InvalidScheme {
                expected: scheme.to_owned(),
            })?;
        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        if path.is_empty() {
            return Err(ParseUrlError::MissingRecipient);
        }

        let decoded = if path.contains([':', '%']) {
            TransactionRequest::decode(path, query).map(Self::Transaction)
        } else {
            TransferRequest::decode(path, query).map(Self::Transfer)
        };

        #[cfg(feature = "telemetry")]
        if let Err(err) = &decoded {
            tracing::debug!(error = %err, "Rejected request URL");
        }

        decoded
    }

    /// Encodes the request under the given scheme.
    #[must_use]
    pub fn encode_with_scheme(&self, scheme: &str) -> String {
        match self {
            Self::Transfer(request) => request.encode_with_scheme(scheme),
            Self::Transaction(request) => request.encode_with_scheme(scheme),
        }
    }
}

impl FromStr for RequestUrl {
    type Err = ParseUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode_with_scheme(SOLANA_SCHEME))
    }
}

impl From<TransferRequest> for RequestUrl {
    fn from(request: TransferRequest) -> Self {
        Self::Transfer(request)
    }
}

impl From<TransactionRequest> for RequestUrl {
    fn from(request: TransactionRequest) -> Self {
        Self::Transaction(request)
    }
}

fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}
