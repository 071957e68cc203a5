//! SPL token program support: mints, token accounts and associated token
//! account derivation for both the Token and Token-2022 programs.

use solana_account::Account;
use solana_pubkey::{Pubkey, pubkey};
use spl_token::solana_program::program_pack::Pack;
use spl_token_2022::extension::StateWithExtensions;

use crate::ledger::{Ledger, LedgerError};

/// Associated Token Account program.
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// The token program a mint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenProgram {
    /// SPL Token.
    Token,
    /// SPL Token-2022.
    Token2022,
}

impl TokenProgram {
    /// Returns the program owning `account_owner`'s accounts, if it is a
    /// token program.
    #[must_use]
    pub fn from_owner(account_owner: &Pubkey) -> Option<Self> {
        if *account_owner == spl_token::id() {
            Some(Self::Token)
        } else if *account_owner == spl_token_2022::id() {
            Some(Self::Token2022)
        } else {
            None
        }
    }

    /// Program id.
    #[must_use]
    pub fn id(self) -> Pubkey {
        match self {
            Self::Token => spl_token::id(),
            Self::Token2022 => spl_token_2022::id(),
        }
    }
}

/// A mint an SPL transfer request pays in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mint {
    /// Address of the mint account.
    pub address: Pubkey,
    /// Decimal places of the token; amounts are scaled by this.
    pub decimals: u8,
    /// Program owning the mint and its token accounts.
    pub program: TokenProgram,
}

impl Mint {
    /// Reads the mint stored at `address`.
    ///
    /// Returns `None` if the account is not an initialized mint of either
    /// token program.
    #[must_use]
    pub fn from_account(address: Pubkey, account: &Account) -> Option<Self> {
        let program = TokenProgram::from_owner(&account.owner)?;
        let decimals = match program {
            TokenProgram::Token => spl_token::state::Mint::unpack(&account.data).ok()?.decimals,
            TokenProgram::Token2022 => {
                StateWithExtensions::<spl_token_2022::state::Mint>::unpack(&account.data)
                    .ok()?
                    .base
                    .decimals
            }
        };
        Some(Self {
            address,
            decimals,
            program,
        })
    }

    /// Associated token account of `owner` for this mint.
    #[must_use]
    pub fn associated_account(&self, owner: &Pubkey) -> Pubkey {
        associated_token_address(owner, &self.address, &self.program.id())
    }
}

/// Failure resolving a mint.
#[derive(Debug, thiserror::Error)]
pub enum MintError {
    /// The mint account does not exist.
    #[error("mint {0} not found")]
    NotFound(Pubkey),
    /// The account is not a mint of a known token program.
    #[error("account {0} is not a token mint")]
    Invalid(Pubkey),
    /// The ledger lookup failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Fetches mint information from the ledger.
///
/// # Errors
///
/// Returns [`MintError`] if the mint account cannot be fetched or parsed.
pub async fn fetch_mint<L: Ledger + ?Sized>(ledger: &L, mint: &Pubkey) -> Result<Mint, MintError> {
    let account = ledger
        .get_account(mint)
        .await?
        .ok_or(MintError::NotFound(*mint))?;
    Mint::from_account(*mint, &account).ok_or(MintError::Invalid(*mint))
}

/// Decoded state of a token account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    /// Mint of the held token.
    pub mint: Pubkey,
    /// Wallet owning the account.
    pub owner: Pubkey,
    /// Balance in base units.
    pub amount: u64,
    /// Whether the account is frozen.
    pub frozen: bool,
}

impl TokenAccount {
    /// Reads a token account.
    ///
    /// Returns `None` if the account is not an initialized token account of
    /// either token program.
    #[must_use]
    pub fn from_account(account: &Account) -> Option<Self> {
        let state = match TokenProgram::from_owner(&account.owner)? {
            TokenProgram::Token => spl_token::state::Account::unpack(&account.data).ok()?,
            TokenProgram::Token2022 => {
                let base =
                    StateWithExtensions::<spl_token_2022::state::Account>::unpack(&account.data)
                        .ok()?
                        .base;
                return Some(Self {
                    mint: base.mint,
                    owner: base.owner,
                    amount: base.amount,
                    frozen: base.is_frozen(),
                });
            }
        };
        Some(Self {
            mint: state.mint,
            owner: state.owner,
            amount: state.amount,
            frozen: state.is_frozen(),
        })
    }
}

/// Derives the associated token account of `owner` for `mint`.
#[must_use]
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Returns `true` if `program` is one of the token programs.
#[must_use]
pub fn is_token_program(program: &Pubkey) -> bool {
    TokenProgram::from_owner(program).is_some()
}

/// Serializes an initialized mint owned by `token_program`.
#[must_use]
pub fn mint_account(decimals: u8, token_program: &Pubkey, lamports: u64) -> Account {
    let state = spl_token::state::Mint {
        decimals,
        is_initialized: true,
        ..Default::default()
    };
    let mut data = vec![0u8; spl_token::state::Mint::LEN];
    state.pack_into_slice(&mut data);
    Account {
        lamports,
        data,
        owner: *token_program,
        executable: false,
        rent_epoch: 0,
    }
}

/// Serializes an initialized token account owned by `token_program`.
#[must_use]
pub fn token_account(
    state: &TokenAccount,
    token_program: &Pubkey,
    lamports: u64,
) -> Account {
    let packed = spl_token::state::Account {
        mint: state.mint,
        owner: state.owner,
        amount: state.amount,
        state: if state.frozen {
            spl_token::state::AccountState::Frozen
        } else {
            spl_token::state::AccountState::Initialized
        },
        ..Default::default()
    };
    let mut data = vec![0u8; spl_token::state::Account::LEN];
    packed.pack_into_slice(&mut data);
    Account {
        lamports,
        data,
        owner: *token_program,
        executable: false,
        rent_epoch: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_from_account_for_both_programs() {
        let address = Pubkey::new_unique();
        let account = mint_account(6, &spl_token::id(), 1);
        assert_eq!(
            Mint::from_account(address, &account),
            Some(Mint {
                address,
                decimals: 6,
                program: TokenProgram::Token,
            })
        );
        let account = mint_account(9, &spl_token_2022::id(), 1);
        let mint = Mint::from_account(address, &account).unwrap();
        assert_eq!(mint.decimals, 9);
        assert_eq!(mint.program.id(), spl_token_2022::id());
    }

    #[test]
    fn test_mint_rejects_foreign_owner() {
        let mut account = mint_account(6, &spl_token::id(), 1);
        account.owner = Pubkey::new_unique();
        assert_eq!(Mint::from_account(Pubkey::new_unique(), &account), None);
    }

    #[test]
    fn test_mint_associated_account_follows_program() {
        let owner = Pubkey::new_unique();
        let mut mint = Mint {
            address: Pubkey::new_unique(),
            decimals: 6,
            program: TokenProgram::Token,
        };
        assert_eq!(
            mint.associated_account(&owner),
            associated_token_address(&owner, &mint.address, &spl_token::id())
        );
        mint.program = TokenProgram::Token2022;
        assert_eq!(
            mint.associated_account(&owner),
            associated_token_address(&owner, &mint.address, &spl_token_2022::id())
        );
    }

    #[test]
    fn test_token_account_round_trip() {
        let state = TokenAccount {
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount: 42,
            frozen: true,
        };
        let account = token_account(&state, &spl_token::id(), 1);
        assert_eq!(TokenAccount::from_account(&account), Some(state));
    }

    #[test]
    fn test_associated_token_address_depends_on_program() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let classic = associated_token_address(&owner, &mint, &spl_token::id());
        let extended = associated_token_address(&owner, &mint, &spl_token_2022::id());
        assert_ne!(classic, extended);
        assert_eq!(
            classic,
            associated_token_address(&owner, &mint, &spl_token::id())
        );
    }

    #[tokio::test]
    async fn test_fetch_mint_missing() {
        let ledger = crate::ledger::InMemoryLedger::new();
        let mint = Pubkey::new_unique();
        let err = fetch_mint(&ledger, &mint).await.unwrap_err();
        assert!(matches!(err, MintError::NotFound(m) if m == mint));
    }
}
