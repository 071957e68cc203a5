#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana ledger support for the Solana Pay protocol.
//!
//! This crate turns the protocol types of [`solpay`] into Solana transactions
//! and watches the ledger for their confirmation.
//!
//! # Architecture
//!
//! - [`ledger`] - The [`Ledger`](ledger::Ledger) collaborator with RPC and
//!   in-memory implementations
//! - [`transaction`] - Versioned transactions that travel partially signed
//! - [`instructions`] - System, memo and SPL token instruction builders
//! - [`token`] - Mints, token accounts and associated token accounts
//! - [`transfer`] - Transfer construction for a [`TransferRequest`](solpay::TransferRequest)
//! - [`gate`] - Predicates deciding which accounts may request a transaction
//! - [`responder`] - The Solana implementation of [`solpay::responder::Responder`]
//! - [`reference`] - Finding and awaiting transactions by reference
//! - [`validate`] - Checking a confirmed transaction against a transfer request
//!
//! # Feature Flags
//!
//! - `rpc` - [`RpcLedger`](ledger::RpcLedger) backed by a JSON-RPC node
//! - `telemetry` - `tracing` spans and events
//!
//! # Example
//!
//! ```ignore
//! use solpay_svm::ledger::{Cluster, RpcLedger};
//! use solpay_svm::reference::{wait_for_reference, FindReferenceOptions, PollPolicy};
//!
//! let ledger = RpcLedger::new(Cluster::Devnet.rpc_url());
//! let found = wait_for_reference(
//!     &ledger,
//!     &reference,
//!     &FindReferenceOptions::default(),
//!     PollPolicy::new(Duration::from_millis(250), Duration::from_secs(60)),
//!     &cancel,
//! )
//! .await?;
//! ```

pub mod gate;
pub mod instructions;
pub mod ledger;
pub mod metadata;
pub mod reference;
pub mod responder;
pub mod token;
pub mod transaction;
pub mod transfer;
pub mod validate;

mod convert;
pub use convert::{AddressExt, ToAddress};

pub use ledger::{Finality, Ledger, LedgerError};
pub use responder::{ResponderConfig, SolanaResponder, TransferAction};
pub use transaction::PartialTransaction;
