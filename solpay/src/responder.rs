//! Transaction-request responder abstraction.
//!
//! A responder answers the two reachable transitions of a transaction
//! request: `GET` returns [`TransactionMetadata`], `POST` returns a
//! [`TransactionResponse`] built for the requesting account. Both are
//! stateless and may run concurrently; implementations only share read-only
//! configuration and a reentrant ledger connection.
//!
//! Transports (see the `solpay-http` crate) hold responders as
//! `Arc<dyn Responder>` and map [`ResponderError`] to status codes through
//! [`ResponderError::kind`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::address::Reference;
use crate::error::ErrorKind;
use crate::proto::{TransactionMetadata, TransactionResponse};

/// A pinned, boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Input of a `POST` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequestContext {
    /// The `account` field of the request body, not yet validated.
    pub account: String,
    /// References carried by the endpoint link's own query string.
    pub references: Vec<Reference>,
}

impl TransactionRequestContext {
    /// Creates a context without extra references.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            references: Vec::new(),
        }
    }

    /// Adds references from the request link.
    #[must_use]
    pub fn with_references(mut self, references: Vec<Reference>) -> Self {
        self.references = references;
        self
    }
}

/// Failure of a responder transition.
#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    /// The account is missing or not a valid address.
    #[error("invalid account: {0}")]
    InvalidAccount(String),
    /// A gating predicate rejected the account.
    #[error("account is not allowed to request this transaction")]
    Forbidden,
    /// The ledger could not be queried.
    #[error("ledger request failed: {0}")]
    Upstream(String),
    /// The transaction could not be constructed.
    #[error("failed to build transaction: {0}")]
    Internal(String),
    /// The responder configuration is unusable.
    #[error("responder misconfigured: {0}")]
    Misconfigured(String),
}

impl ResponderError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAccount(_) => ErrorKind::MalformedInput,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Internal(_) | Self::Misconfigured(_) => ErrorKind::Internal,
        }
    }

    /// Returns the message safe to show to the caller.
    ///
    /// Internal failures are reduced to a generic text; their details are
    /// only meant for server logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_owned(),
            Self::Misconfigured(_) => "server configuration error".to_owned(),
            Self::Upstream(_) => "ledger unavailable".to_owned(),
            Self::InvalidAccount(_) | Self::Forbidden => self.to_string(),
        }
    }
}

/// Answers `GET` and `POST` for one transaction-request link.
pub trait Responder: Send + Sync {
    /// Returns the endpoint's self-description. Free of side effects.
    fn metadata(&self) -> BoxFuture<'_, Result<TransactionMetadata, ResponderError>>;

    /// Builds a transaction for the requesting account.
    fn transaction(
        &self,
        context: TransactionRequestContext,
    ) -> BoxFuture<'_, Result<TransactionResponse, ResponderError>>;
}

impl<T: Responder + ?Sized> Responder for Arc<T> {
    fn metadata(&self) -> BoxFuture<'_, Result<TransactionMetadata, ResponderError>> {
        (**self).metadata()
    }

    fn transaction(
        &self,
        context: TransactionRequestContext,
    ) -> BoxFuture<'_, Result<TransactionResponse, ResponderError>> {
        (**self).transaction(context)
    }
}
