//! Base58 account addresses and references.
//!
//! Solana Pay carries every binary field (recipient, token mint, references)
//! as base58 text. [`Address`] is the validated 32-byte form of such a field.
//! [`Reference`] wraps an address that only exists to make a transaction
//! searchable: it is generated at request issuance, embedded in the
//! transaction as a read-only non-signer key, and looked up afterwards.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

use crate::error::ErrorKind;

/// Length in bytes of an account address.
pub const ADDRESS_LEN: usize = 32;

/// Error parsing a base58 address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The input is not valid base58.
    #[error("invalid base58: {0}")]
    Base58(String),
    /// The input decoded to the wrong number of bytes.
    #[error("expected {ADDRESS_LEN} bytes, got {0}")]
    Length(usize),
}

impl AddressError {
    /// Address errors always stem from caller input.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::MalformedInput
    }
}

/// A 32-byte account address, displayed as base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Creates an address from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the address.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; ADDRESS_LEN] {
        self.0
    }

    /// Returns the base58 text form of the address.
    #[must_use]
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Address> for [u8; ADDRESS_LEN] {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::Base58(e.to_string()))?;
        let array: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| AddressError::Length(b.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// An opaque 32-byte identifier embedded in a transaction for later lookup.
///
/// References must not collide across pending requests, so fresh ones come
/// from [`Reference::random`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(Address);

impl Reference {
    /// Generates a new reference from 32 random bytes.
    #[must_use]
    pub fn random() -> Self {
        Self(Address::new(rand::random::<[u8; ADDRESS_LEN]>()))
    }

    /// Creates a reference from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(Address::new(bytes))
    }

    /// Returns the reference as an account address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.0
    }
}

impl From<Address> for Reference {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl From<Reference> for Address {
    fn from(reference: Reference) -> Self {
        reference.0
    }
}

impl FromStr for Reference {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_str(s).map(Self)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MVINES: &str = "mvines9iiHiQTysrwkJjGf2gb9Ex9jXJX8ns3qwf2kN";

    #[test]
    fn test_address_parses_and_displays_base58() {
        let address: Address = MVINES.parse().unwrap();
        assert_eq!(address.to_string(), MVINES);
    }

    #[test]
    fn test_address_rejects_non_base58() {
        let err = "not-base58-0OIl".parse::<Address>().unwrap_err();
        assert!(matches!(err, AddressError::Base58(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        let short = bs58::encode([7u8; 16]).into_string();
        let err = short.parse::<Address>().unwrap_err();
        assert_eq!(err, AddressError::Length(16));
    }

    #[test]
    fn test_address_serde_as_string() {
        let address: Address = MVINES.parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{MVINES}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn test_random_references_differ() {
        let a = Reference::random();
        let b = Reference::random();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reference_text_form_matches_address() {
        let reference = Reference::from_bytes([3u8; ADDRESS_LEN]);
        let parsed: Reference = reference.to_string().parse().unwrap();
        assert_eq!(parsed, reference);
        assert_eq!(parsed.address().to_bytes(), [3u8; ADDRESS_LEN]);
    }
}
