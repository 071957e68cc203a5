//! Solana Pay transaction-request server.
//!
//! Serves one transaction-request endpoint built from a TOML configuration,
//! and offers the commands a merchant needs around it: printing a payment
//! link with a fresh reference and watching the ledger for its payment.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`app`] - Assembly of ledger, gate and responder into a router
//! - [`shutdown`] - Signal handling shared by `serve` and `watch`

pub mod app;
pub mod config;
pub mod shutdown;

pub use app::{AppError, router};
pub use config::{ConfigError, ServerConfig};
pub use shutdown::Shutdown;
