//! Error classification shared across the Solana Pay crates.
//!
//! Every error type in the workspace reports one of these kinds through a
//! `kind()` method so transports can decide status codes and callers can
//! decide whether to poll again.

use std::fmt;

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid caller input (recipient, account, amount, URL).
    ///
    /// Surfaced synchronously, never retried.
    MalformedInput,
    /// A reference lookup found nothing yet. Expected while polling.
    NotFound,
    /// A gating predicate rejected the caller.
    Forbidden,
    /// The ledger node could not be reached or returned an error.
    ///
    /// Retrying is the caller's responsibility.
    Upstream,
    /// An unexpected construction or configuration failure.
    Internal,
}

impl ErrorKind {
    /// Returns `true` if the caller may retry the same operation later.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::NotFound | Self::Upstream)
    }

    /// Returns the machine-readable name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Upstream => "upstream_failure",
            Self::Internal => "internal_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_not_found_and_upstream_are_retryable() {
        assert!(ErrorKind::NotFound.is_retryable());
        assert!(ErrorKind::Upstream.is_retryable());
        assert!(!ErrorKind::MalformedInput.is_retryable());
        assert!(!ErrorKind::Forbidden.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }
}
