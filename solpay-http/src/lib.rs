#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for Solana Pay transaction requests.
//!
//! A transaction-request link is an HTTPS endpoint answering two calls:
//! `GET` returns the endpoint's label and icon, `POST {account}` returns a
//! transaction for that account to sign. This crate provides both ends.
//!
//! # Modules
//!
//! - [`error`] - Mapping of protocol error kinds to HTTP status codes
//! - [`server`] - `axum` router serving a [`Responder`](solpay::responder::Responder) (feature: `server`)
//! - [`client`] - `reqwest` client used by wallets (feature: `client`)
//!
//! # Example
//!
//! ```ignore
//! use solpay_http::server::responder_router;
//!
//! let app = responder_router("/pay", Arc::new(responder));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod error;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;

pub use error::status_for;
