//! Wallet-side client of transaction-request endpoints.
//!
//! [`TransactionRequestClient`] performs the two calls a wallet makes after
//! scanning a `solana:<link>` URL: `GET` for the label and icon shown to the
//! user, then `POST {account}` for the transaction to sign.

use std::time::Duration;

use http::StatusCode;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use solpay::proto::{
    ErrorResponse, MetadataError, TransactionMetadata, TransactionRequestBody, TransactionResponse,
};
use solpay::{Address, ErrorKind, TransactionRequest};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span, instrument};

use crate::error::kind_for_status;

/// Failure of a transaction-request call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be sent.
    #[error("{context}: {source}")]
    Http {
        /// Which call failed.
        context: &'static str,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered 2xx with an unexpected body.
    #[error("{context}: failed to deserialize response: {source}")]
    JsonDeserialization {
        /// Which call failed.
        context: &'static str,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },
    /// The endpoint answered with a non-success status.
    #[error("{context}: endpoint returned {status}: {message}")]
    Status {
        /// Which call failed.
        context: &'static str,
        /// Returned status.
        status: StatusCode,
        /// The `error` field of the body, or the raw body.
        message: String,
    },
    /// The response body could not be read.
    #[error("{context}: failed to read response body: {source}")]
    ResponseBodyRead {
        /// Which call failed.
        context: &'static str,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint described itself with an unusable label or icon.
    #[error("invalid endpoint metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),
}

impl ClientError {
    /// Classifies the failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Status { status, .. } => kind_for_status(*status),
            Self::Http { .. } | Self::ResponseBodyRead { .. } => ErrorKind::Upstream,
            Self::JsonDeserialization { .. } | Self::InvalidMetadata(_) => ErrorKind::MalformedInput,
        }
    }
}

/// HTTP client for transaction-request endpoints.
#[derive(Debug, Clone, Default)]
pub struct TransactionRequestClient {
    client: Client,
    timeout: Option<Duration>,
}

impl TransactionRequestClient {
    /// Creates a client with a fresh connection pool and no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses an existing reqwest client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fetches the label and icon of the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the call fails or the metadata is unusable.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "solpay.client.metadata", skip_all, fields(link = %request.link), err)
    )]
    pub async fn fetch_metadata(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionMetadata, ClientError> {
        let metadata: TransactionMetadata = self.get_json(&request.link, "GET metadata").await?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Requests a transaction for `account`.
    ///
    /// The returned transaction is not inspected; callers decode and review
    /// it before signing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the call fails or the endpoint refuses.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "solpay.client.transaction", skip_all, fields(link = %request.link, account = %account), err)
    )]
    pub async fn fetch_transaction(
        &self,
        request: &TransactionRequest,
        account: &Address,
    ) -> Result<TransactionResponse, ClientError> {
        let body = TransactionRequestBody {
            account: account.to_string(),
        };
        self.post_json(&request.link, "POST transaction", &body)
            .await
    }

    async fn get_json<R>(&self, url: &Url, context: &'static str) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let mut builder = self.client.get(url.clone());
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let fut = async {
            let result = send(builder, context).await;
            record_result_on_span(&result);
            result
        };
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::debug_span!(
            "http.get",
            %url,
            otel.status_code = tracing::field::Empty,
            error.kind = tracing::field::Empty,
        ));
        fut.await
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, ClientError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let mut builder = self.client.post(url.clone()).json(payload);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let fut = async {
            let result = send(builder, context).await;
            record_result_on_span(&result);
            result
        };
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::debug_span!(
            "http.post",
            %url,
            otel.status_code = tracing::field::Empty,
            error.kind = tracing::field::Empty,
        ));
        fut.await
    }
}

async fn send<R: DeserializeOwned>(
    builder: reqwest::RequestBuilder,
    context: &'static str,
) -> Result<R, ClientError> {
    let response = builder
        .send()
        .await
        .map_err(|source| ClientError::Http { context, source })?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|source| ClientError::ResponseBodyRead { context, source })?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorResponse>(&bytes).map_or_else(
            |_| String::from_utf8_lossy(&bytes).into_owned(),
            |body| body.error,
        );
        return Err(ClientError::Status {
            context,
            status,
            message,
        });
    }
    serde_json::from_slice(&bytes)
        .map_err(|source| ClientError::JsonDeserialization { context, source })
}

/// Records the outcome on the enclosing `http.*` span, which declares both
/// fields.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R>(result: &Result<R, ClientError>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.kind", err.kind().as_str());
            tracing::debug!(error = %err, "transaction request call failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
const fn record_result_on_span<R>(_result: &Result<R, ClientError>) {}
