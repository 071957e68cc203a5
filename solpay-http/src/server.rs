//! Axum router serving one transaction-request link.
//!
//! | Method | Body | Success |
//! |---|---|---|
//! | `GET` | - | `200 {label, icon}` |
//! | `POST` | `{account}` | `200 {transaction, message?}` |
//! | other | - | `405 {error}` |
//!
//! Failures answer `{error}` with the status of their
//! [`ErrorKind`](solpay::ErrorKind). Internal and upstream details are
//! logged, never returned.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use http::{Method, StatusCode};
use solpay::proto::{
    ErrorResponse, TransactionMetadata, TransactionRequestBody, TransactionResponse,
};
use solpay::responder::{Responder, ResponderError, TransactionRequestContext};
use solpay::{AddressError, ErrorKind, Reference};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::status_for;

/// Shared state of the responder routes.
pub type ResponderState = Arc<dyn Responder>;

/// Query parameter carrying per-request references.
pub const REFERENCE_PARAM: &str = "reference";

/// Failure of a transaction-request call.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The `POST` body is missing or not `{account}`.
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    /// A `reference` query parameter is not an address.
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] AddressError),
    /// The method is neither `GET` nor `POST`.
    #[error("method not supported")]
    MethodNotAllowed,
    /// The responder failed.
    #[error(transparent)]
    Responder(#[from] ResponderError),
}

impl EndpointError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBody(_) | Self::InvalidReference(_) | Self::MethodNotAllowed => {
                ErrorKind::MalformedInput
            }
            Self::Responder(err) => err.kind(),
        }
    }

    /// Returns the status code of the failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            other => status_for(other.kind()),
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Responder(err) => err.public_message(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for EndpointError {
    fn into_response(self) -> Response {
        let status = self.status();
        #[cfg(feature = "telemetry")]
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "transaction request failed");
        } else {
            tracing::debug!(error = %self, %status, "transaction request rejected");
        }
        (status, Json(ErrorResponse::new(self.public_message()))).into_response()
    }
}

fn references(query: Option<&str>) -> Result<Vec<Reference>, EndpointError> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == REFERENCE_PARAM)
        .map(|(_, value)| value.parse::<Reference>().map_err(EndpointError::from))
        .collect()
}

/// `GET <link>`: returns the endpoint metadata.
///
/// # Errors
///
/// Returns 500 if the responder is misconfigured.
pub async fn get_metadata(
    State(responder): State<ResponderState>,
) -> Result<Json<TransactionMetadata>, EndpointError> {
    let metadata = responder.metadata().await?;
    Ok(Json(metadata))
}

/// `POST <link>`: returns a transaction for the requesting account.
///
/// `reference` parameters of the request URL are forwarded to the responder.
///
/// # Errors
///
/// Returns 400 on a malformed body or account, 403 when the account is
/// gated out, 502 when the ledger fails, and 500 on internal failures.
pub async fn post_transaction(
    State(responder): State<ResponderState>,
    RawQuery(query): RawQuery,
    body: Result<Json<TransactionRequestBody>, JsonRejection>,
) -> Result<Json<TransactionResponse>, EndpointError> {
    let Json(body) = body.map_err(|e| EndpointError::InvalidBody(e.body_text()))?;
    let context = TransactionRequestContext::new(body.account)
        .with_references(references(query.as_deref())?);
    let response = responder.transaction(context).await?;
    Ok(Json(response))
}

async fn method_not_allowed() -> EndpointError {
    EndpointError::MethodNotAllowed
}

/// Builds a router serving `responder` at `path`.
///
/// Any origin may call the endpoint; wallets run in browsers as well as
/// natively.
pub fn responder_router(path: &str, responder: ResponderState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    axum::Router::new()
        .route(
            path,
            get(get_metadata)
                .post(post_transaction)
                .fallback(method_not_allowed),
        )
        .with_state(responder)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
