#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the Solana Pay protocol.
//!
//! This crate provides the chain-agnostic building blocks of Solana Pay:
//! request URLs that wallets scan from QR codes, the JSON bodies exchanged
//! with transaction-request endpoints, and the [`responder::Responder`]
//! abstraction that endpoint implementations plug into.
//!
//! # Overview
//!
//! Solana Pay defines two request forms, both carried by a `solana:` URL:
//!
//! - **Transfer requests** (`solana:<recipient>?amount=..&reference=..`) are
//!   non-interactive: the wallet builds the transfer itself.
//! - **Transaction requests** (`solana:<link>`) point the wallet at an HTTP
//!   endpoint which describes itself on `GET` and returns a serialized
//!   transaction on `POST`.
//!
//! Both forms correlate the eventual on-chain transaction with the
//! off-chain request through a [`Reference`], a random 32-byte key embedded
//! in the transaction as a read-only account.
//!
//! # Modules
//!
//! - [`address`] - Base58 account addresses and references
//! - [`amount`] - Non-negative decimal amounts
//! - [`encoding`] - Base64 transport encoding for transaction blobs
//! - [`error`] - Error classification shared by every crate of the workspace
//! - [`proto`] - JSON wire types of the transaction-request endpoint
//! - [`responder`] - Transaction-request responder abstraction
//! - [`url`] - `solana:` URL encoder and decoder
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod address;
pub mod amount;
pub mod encoding;
pub mod error;
pub mod proto;
pub mod responder;
pub mod url;

pub use address::{Address, AddressError, Reference};
pub use amount::{Amount, AmountError};
pub use error::ErrorKind;
pub use url::{ParseUrlError, RequestUrl, TransactionRequest, TransferRequest};
