//! Transfer construction for a [`TransferRequest`].
//!
//! The transfer is either a System program transfer of lamports or an SPL
//! `TransferChecked` between the associated token accounts of the sender and
//! the recipient. An optional memo instruction precedes it, and every
//! reference is appended to the transfer instruction as a read-only,
//! non-signer key so the transaction can later be found by reference.

use solana_account::Account;
use solana_instruction::Instruction;
use solana_pubkey::Pubkey;
use solpay::{AmountError, ErrorKind, TransferRequest};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::convert::AddressExt;
use crate::instructions::{self, SYSTEM_PROGRAM_PUBKEY};
use crate::ledger::{Ledger, LedgerError};
use crate::token::{self, Mint, MintError, TokenAccount};
use crate::transaction::{PartialTransaction, TransactionError};

/// Decimals of native SOL (lamports per SOL = 10^9).
pub const SOL_DECIMALS: u8 = 9;

/// Failure building a transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The request carries no amount.
    #[error("transfer request has no amount")]
    MissingAmount,
    /// The amount is not representable in base units.
    #[error(transparent)]
    Amount(#[from] AmountError),
    /// The sender account does not exist.
    #[error("sender {0} not found")]
    SenderNotFound(Pubkey),
    /// The sender is not a System-owned wallet.
    #[error("sender {0} is not owned by the system program")]
    SenderOwnerInvalid(Pubkey),
    /// The sender is a program.
    #[error("sender {0} is executable")]
    SenderExecutable(Pubkey),
    /// The recipient account does not exist.
    #[error("recipient {0} not found")]
    RecipientNotFound(Pubkey),
    /// The recipient is not a System-owned wallet.
    #[error("recipient {0} is not owned by the system program")]
    RecipientOwnerInvalid(Pubkey),
    /// The recipient is a program.
    #[error("recipient {0} is executable")]
    RecipientExecutable(Pubkey),
    /// The sender cannot cover the amount.
    #[error("insufficient funds: {required} required, {available} available")]
    InsufficientFunds {
        /// Base units to transfer.
        required: u64,
        /// Base units held by the sender.
        available: u64,
    },
    /// The token mint could not be resolved.
    #[error(transparent)]
    Mint(#[from] MintError),
    /// A token account of the transfer does not exist.
    #[error("token account {0} not found")]
    TokenAccountNotFound(Pubkey),
    /// A token account of the transfer is frozen.
    #[error("token account {0} is frozen")]
    TokenAccountFrozen(Pubkey),
    /// The transfer instruction could not be encoded.
    #[error("failed to build transfer instruction: {0}")]
    Instruction(String),
    /// The transaction could not be assembled.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    /// The ledger lookup failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TransferError {
    /// Classifies the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(_) | Self::Mint(MintError::Ledger(_)) => ErrorKind::Upstream,
            Self::Instruction(_) | Self::Transaction(_) => ErrorKind::Internal,
            _ => ErrorKind::MalformedInput,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Plan {
    Native {
        lamports: u64,
    },
    Token {
        mint: Mint,
        units: u64,
        source: Pubkey,
        destination: Pubkey,
    },
}

async fn plan<L: Ledger + ?Sized>(
    ledger: &L,
    sender: &Pubkey,
    request: &TransferRequest,
) -> Result<Plan, TransferError> {
    let amount = request.amount.ok_or(TransferError::MissingAmount)?;
    let Some(mint_address) = request.spl_token.as_ref().map(AddressExt::to_pubkey) else {
        return Ok(Plan::Native {
            lamports: amount.to_base_units(SOL_DECIMALS)?,
        });
    };
    let mint = token::fetch_mint(ledger, &mint_address).await?;
    Ok(Plan::Token {
        mint,
        units: amount.to_base_units(mint.decimals)?,
        source: mint.associated_account(sender),
        destination: mint.associated_account(&request.recipient.to_pubkey()),
    })
}

fn assemble(
    sender: &Pubkey,
    request: &TransferRequest,
    plan: &Plan,
    witness: Option<&Pubkey>,
) -> Result<Vec<Instruction>, TransferError> {
    let mut ixs = Vec::with_capacity(2);
    if let Some(memo) = &request.memo {
        ixs.push(instructions::memo(memo));
    }
    let mut transfer = match *plan {
        Plan::Native { lamports } => {
            instructions::system_transfer(sender, &request.recipient.to_pubkey(), lamports)
        }
        Plan::Token {
            mint,
            units,
            source,
            destination,
        } => instructions::token_transfer_checked(
            &mint,
            &source,
            &destination,
            sender,
            units,
        )
        .map_err(TransferError::Instruction)?,
    };
    instructions::append_readonly(
        &mut transfer,
        request.references.iter().map(AddressExt::to_pubkey),
        false,
    );
    if let Some(witness) = witness {
        instructions::append_readonly(&mut transfer, [*witness], true);
    }
    ixs.push(transfer);
    Ok(ixs)
}

/// Builds the instructions of a transfer from `sender` without checking
/// balances.
///
/// When `witness` is given, it is appended to the transfer instruction as a
/// read-only signer after the references.
///
/// # Errors
///
/// Returns [`TransferError`] if the amount is missing or too precise, or the
/// mint cannot be resolved.
pub async fn transfer_instructions<L: Ledger + ?Sized>(
    ledger: &L,
    sender: &Pubkey,
    request: &TransferRequest,
    witness: Option<&Pubkey>,
) -> Result<Vec<Instruction>, TransferError> {
    let plan = plan(ledger, sender, request).await?;
    assemble(sender, request, &plan, witness)
}

fn check_wallet(
    account: Option<Account>,
    address: Pubkey,
    not_found: fn(Pubkey) -> TransferError,
    owner_invalid: fn(Pubkey) -> TransferError,
    executable: fn(Pubkey) -> TransferError,
) -> Result<Account, TransferError> {
    let account = account.ok_or_else(|| not_found(address))?;
    if account.owner != SYSTEM_PROGRAM_PUBKEY {
        return Err(owner_invalid(address));
    }
    if account.executable {
        return Err(executable(address));
    }
    Ok(account)
}

fn check_token_account(
    account: Option<&Account>,
    address: Pubkey,
) -> Result<TokenAccount, TransferError> {
    let state = account
        .and_then(TokenAccount::from_account)
        .ok_or(TransferError::TokenAccountNotFound(address))?;
    if state.frozen {
        return Err(TransferError::TokenAccountFrozen(address));
    }
    Ok(state)
}

/// Creates an unsigned transaction paying `request` from `sender`.
///
/// The sender must be an existing wallet holding enough lamports, or enough
/// tokens in its associated token account. For SPL transfers the recipient's
/// associated token account must already exist.
///
/// # Errors
///
/// Returns [`TransferError`] if a check fails or the ledger cannot be
/// queried.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "solpay.create_transfer", skip_all, fields(sender = %sender), err)
)]
pub async fn create_transfer<L: Ledger + ?Sized>(
    ledger: &L,
    sender: &Pubkey,
    request: &TransferRequest,
) -> Result<PartialTransaction, TransferError> {
    let sender_account = check_wallet(
        ledger.get_account(sender).await?,
        *sender,
        TransferError::SenderNotFound,
        TransferError::SenderOwnerInvalid,
        TransferError::SenderExecutable,
    )?;
    let plan = plan(ledger, sender, request).await?;
    match plan {
        Plan::Native { lamports } => {
            let recipient = request.recipient.to_pubkey();
            check_wallet(
                ledger.get_account(&recipient).await?,
                recipient,
                TransferError::RecipientNotFound,
                TransferError::RecipientOwnerInvalid,
                TransferError::RecipientExecutable,
            )?;
            if lamports > sender_account.lamports {
                return Err(TransferError::InsufficientFunds {
                    required: lamports,
                    available: sender_account.lamports,
                });
            }
        }
        Plan::Token {
            units,
            source,
            destination,
            ..
        } => {
            let accounts = ledger.get_multiple_accounts(&[source, destination]).await?;
            let source_state = check_token_account(accounts.first().and_then(Option::as_ref), source)?;
            check_token_account(accounts.get(1).and_then(Option::as_ref), destination)?;
            if units > source_state.amount {
                return Err(TransferError::InsufficientFunds {
                    required: units,
                    available: source_state.amount,
                });
            }
        }
    }
    let ixs = assemble(sender, request, &plan, None)?;
    let blockhash = ledger.latest_blockhash().await?;
    Ok(PartialTransaction::compile(sender, &ixs, blockhash)?)
}
