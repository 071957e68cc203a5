//! Conversions between protocol addresses and Solana public keys.

use solana_pubkey::Pubkey;
use solpay::{Address, Reference};

/// Views a protocol address as a Solana public key.
pub trait AddressExt {
    /// Returns the public key with the same 32 bytes.
    fn to_pubkey(&self) -> Pubkey;
}

impl AddressExt for Address {
    fn to_pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.to_bytes())
    }
}

impl AddressExt for Reference {
    fn to_pubkey(&self) -> Pubkey {
        self.address().to_pubkey()
    }
}

/// Views a Solana public key as a protocol address.
pub trait ToAddress {
    /// Returns the address with the same 32 bytes.
    fn to_address(&self) -> Address;
}

impl ToAddress for Pubkey {
    fn to_address(&self) -> Address {
        Address::new(self.to_bytes())
    }
}
