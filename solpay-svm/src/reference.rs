//! Finding transactions by reference.
//!
//! A reference is a throwaway address embedded in a transaction as a
//! read-only key. Any transaction carrying it shows up in the reference's
//! signature history, which is all [`find_reference`] looks at: one history
//! query, no cryptographic verification of what it returns. Use
//! [`validate_transfer`](crate::validate::validate_transfer) to check the
//! found transaction.
//!
//! [`wait_for_reference`] repeats the lookup on a fixed interval until it
//! matches, fails, times out or is cancelled. There are no built-in interval
//! or timeout values; callers choose both.

use std::time::Duration;

use solana_signature::Signature;
use solpay::{ErrorKind, Reference};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::convert::AddressExt;
use crate::ledger::{Finality, Ledger, LedgerError, SignatureInfo, SignatureQuery};

/// Failure of a single reference lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FindReferenceError {
    /// No transaction carrying the reference was found (yet).
    #[error("no transaction found for reference")]
    NotFound,
    /// The ledger could not be queried.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl FindReferenceError {
    /// Classifies the failure. `NotFound` is expected while polling.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Ledger(_) => ErrorKind::Upstream,
        }
    }
}

/// Paging and confirmation parameters of [`find_reference`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FindReferenceOptions {
    /// Confirmation level of matching transactions.
    pub finality: Finality,
    /// Only consider transactions older than this one.
    pub before: Option<Signature>,
    /// Only consider transactions newer than this one.
    pub until: Option<Signature>,
    /// Maximum number of history entries fetched.
    pub limit: Option<usize>,
}

impl FindReferenceOptions {
    /// Looks up at the given finality with no paging.
    #[must_use]
    pub fn at(finality: Finality) -> Self {
        Self {
            finality,
            ..Self::default()
        }
    }

    fn query(&self) -> SignatureQuery {
        SignatureQuery {
            before: self.before,
            until: self.until,
            limit: self.limit,
            finality: self.finality,
        }
    }
}

/// Finds the oldest transaction in one page of the reference's history.
///
/// The ledger returns history newest first, so the last entry of the page is
/// returned. With default options this is the oldest transaction the node
/// reports in its first page.
///
/// # Errors
///
/// Returns [`FindReferenceError::NotFound`] when the history is empty and
/// [`FindReferenceError::Ledger`] when the query fails.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "solpay.find_reference", skip_all, fields(reference = %reference))
)]
pub async fn find_reference<L: Ledger + ?Sized>(
    ledger: &L,
    reference: &Reference,
    options: &FindReferenceOptions,
) -> Result<SignatureInfo, FindReferenceError> {
    let mut page = ledger
        .signatures_for_address(&reference.to_pubkey(), &options.query())
        .await?;
    page.pop().ok_or(FindReferenceError::NotFound)
}

/// Polling schedule of [`wait_for_reference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two lookups.
    pub interval: Duration,
    /// Total time after which waiting stops.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Creates a schedule.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Failure of [`wait_for_reference`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// No transaction appeared before the timeout.
    #[error("no transaction found for reference within {0:?}")]
    TimedOut(Duration),
    /// The wait was cancelled.
    #[error("wait for reference cancelled")]
    Cancelled,
    /// A lookup failed with something other than not-found.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl WaitError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TimedOut(_) | Self::Cancelled => ErrorKind::NotFound,
            Self::Ledger(_) => ErrorKind::Upstream,
        }
    }
}

/// Polls for a transaction carrying `reference`.
///
/// The first lookup happens immediately. The loop ends with the first match,
/// the first ledger error, the timeout, or cancellation through `cancel`,
/// whichever comes first.
///
/// # Errors
///
/// Returns [`WaitError`] describing why no transaction was returned.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "solpay.wait_for_reference", skip_all, fields(reference = %reference), err)
)]
pub async fn wait_for_reference<L: Ledger + ?Sized>(
    ledger: &L,
    reference: &Reference,
    options: &FindReferenceOptions,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<SignatureInfo, WaitError> {
    let deadline = Instant::now() + policy.timeout;
    loop {
        let lookup = tokio::select! {
            () = cancel.cancelled() => return Err(WaitError::Cancelled),
            lookup = find_reference(ledger, reference, options) => lookup,
        };
        match lookup {
            Ok(found) => return Ok(found),
            Err(FindReferenceError::NotFound) => {}
            Err(FindReferenceError::Ledger(e)) => return Err(e.into()),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::TimedOut(policy.timeout));
        }
        #[cfg(feature = "telemetry")]
        tracing::trace!("reference not found yet");
        let wake = (now + policy.interval).min(deadline);
        tokio::select! {
            () = cancel.cancelled() => return Err(WaitError::Cancelled),
            () = tokio::time::sleep_until(wake) => {}
        }
    }
}
