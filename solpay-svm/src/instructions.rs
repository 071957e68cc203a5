//! Instruction builders for the programs a Solana Pay transfer touches.

use solana_instruction::{AccountMeta, Instruction};
use solana_pubkey::{Pubkey, pubkey};

use crate::token::{Mint, TokenProgram};

/// System program.
pub const SYSTEM_PROGRAM_PUBKEY: Pubkey = pubkey!("11111111111111111111111111111111");

/// SPL Memo program (v2).
pub const MEMO_PROGRAM_PUBKEY: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

// SystemInstruction::Transfer, bincode-encoded as a u32 variant index.
const SYSTEM_TRANSFER_TAG: u32 = 2;

/// Builds a System program transfer of `lamports` from `from` to `to`.
#[must_use]
pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_PUBKEY,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

/// Decodes the lamports of a System program transfer instruction.
#[must_use]
pub fn decode_system_transfer(program_id: &Pubkey, data: &[u8]) -> Option<u64> {
    if *program_id != SYSTEM_PROGRAM_PUBKEY || data.len() != 12 {
        return None;
    }
    let (tag, lamports) = data.split_at(4);
    if u32::from_le_bytes(tag.try_into().ok()?) != SYSTEM_TRANSFER_TAG {
        return None;
    }
    Some(u64::from_le_bytes(lamports.try_into().ok()?))
}

/// Builds a memo instruction. Signer-less, so the memo is unattributed.
#[must_use]
pub fn memo(text: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_PUBKEY,
        accounts: Vec::new(),
        data: text.as_bytes().to_vec(),
    }
}

/// Builds a `TransferChecked` between two token accounts of `mint`.
///
/// # Errors
///
/// Returns the token program's error if the instruction cannot be encoded.
pub fn token_transfer_checked(
    mint: &Mint,
    source: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
) -> Result<Instruction, String> {
    let program_id = mint.program.id();
    match mint.program {
        TokenProgram::Token => spl_token::instruction::transfer_checked(
            &program_id,
            source,
            &mint.address,
            destination,
            authority,
            &[],
            amount,
            mint.decimals,
        )
        .map_err(|e| format!("{e}")),
        TokenProgram::Token2022 => spl_token_2022::instruction::transfer_checked(
            &program_id,
            source,
            &mint.address,
            destination,
            authority,
            &[],
            amount,
            mint.decimals,
        )
        .map_err(|e| format!("{e}")),
    }
}

/// Appends read-only keys to an instruction.
///
/// Used for references (`is_signer = false`) and the server's authorization
/// witness (`is_signer = true`).
pub fn append_readonly(ix: &mut Instruction, keys: impl IntoIterator<Item = Pubkey>, is_signer: bool) {
    ix.accounts
        .extend(keys.into_iter().map(|key| AccountMeta::new_readonly(key, is_signer)));
}
