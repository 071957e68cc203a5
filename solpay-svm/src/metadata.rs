//! Metaplex token metadata accounts.
//!
//! Only the fields needed to decide collection membership are decoded. The
//! account is Borsh encoded; fields appended by later program versions
//! (edition nonce, token standard, collection) may be missing from old
//! accounts and then decode as absent.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_pubkey::{Pubkey, pubkey};

/// Metaplex Token Metadata program.
pub const TOKEN_METADATA_PROGRAM_PUBKEY: Pubkey =
    pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

// Account discriminator of a `MetadataV1` account.
const METADATA_V1_KEY: u8 = 4;

/// Size the program allocates for a metadata account.
pub const METADATA_ACCOUNT_LEN: usize = 679;

#[derive(BorshDeserialize, BorshSerialize)]
struct CreatorLayout {
    address: [u8; 32],
    verified: bool,
    share: u8,
}

#[derive(BorshDeserialize, BorshSerialize)]
struct DataLayout {
    name: String,
    symbol: String,
    uri: String,
    seller_fee_basis_points: u16,
    creators: Option<Vec<CreatorLayout>>,
}

#[derive(BorshDeserialize, BorshSerialize)]
struct MetadataLayout {
    key: u8,
    update_authority: [u8; 32],
    mint: [u8; 32],
    data: DataLayout,
    primary_sale_happened: bool,
    is_mutable: bool,
}

#[derive(BorshDeserialize, BorshSerialize)]
struct CollectionLayout {
    verified: bool,
    key: [u8; 32],
}

// Decodes a field appended after the original layout. Missing or garbled
// trailing bytes read as `None`.
fn trailing<T: BorshDeserialize>(buf: &mut &[u8]) -> Option<T> {
    Option::<T>::deserialize(buf).ok().flatten()
}

/// Derives the metadata account of `mint`.
#[must_use]
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    let (address, _) = Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_PUBKEY.as_ref(),
            mint.as_ref(),
        ],
        &TOKEN_METADATA_PROGRAM_PUBKEY,
    );
    address
}

/// Collection a token claims to belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    /// Whether the collection authority has verified the membership.
    pub verified: bool,
    /// Mint of the collection NFT.
    pub key: Pubkey,
}

/// The decoded prefix of a metadata account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// Authority allowed to update the metadata.
    pub update_authority: Pubkey,
    /// Mint the metadata describes.
    pub mint: Pubkey,
    /// Token name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// URI of the off-chain JSON.
    pub uri: String,
    /// Collection, if the account records one.
    pub collection: Option<Collection>,
}

impl TokenMetadata {
    /// Decodes a metadata account.
    ///
    /// Returns `None` if the data is not a `MetadataV1` account. Accounts
    /// written before collections existed decode with `collection: None`.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut buf = data;
        let head = MetadataLayout::deserialize(&mut buf).ok()?;
        if head.key != METADATA_V1_KEY {
            return None;
        }
        let _edition_nonce: Option<u8> = trailing(&mut buf);
        let _token_standard: Option<u8> = trailing(&mut buf);
        let collection = trailing::<CollectionLayout>(&mut buf).map(|c| Collection {
            verified: c.verified,
            key: Pubkey::new_from_array(c.key),
        });

        // Metaplex pads strings with NULs.
        let unpad = |s: String| s.trim_end_matches('\0').to_owned();
        Some(Self {
            update_authority: Pubkey::new_from_array(head.update_authority),
            mint: Pubkey::new_from_array(head.mint),
            name: unpad(head.data.name),
            symbol: unpad(head.data.symbol),
            uri: unpad(head.data.uri),
            collection,
        })
    }

    /// Encodes the account as the program stores it: without creators,
    /// zero-padded to [`METADATA_ACCOUNT_LEN`].
    ///
    /// # Errors
    ///
    /// Returns the Borsh writer's error.
    pub fn to_account_data(&self) -> std::io::Result<Vec<u8>> {
        let head = MetadataLayout {
            key: METADATA_V1_KEY,
            update_authority: self.update_authority.to_bytes(),
            mint: self.mint.to_bytes(),
            data: DataLayout {
                name: self.name.clone(),
                symbol: self.symbol.clone(),
                uri: self.uri.clone(),
                seller_fee_basis_points: 0,
                creators: None,
            },
            primary_sale_happened: false,
            is_mutable: true,
        };
        let tail = (
            None::<u8>,
            None::<u8>,
            self.collection.map(|c| CollectionLayout {
                verified: c.verified,
                key: c.key.to_bytes(),
            }),
        );
        let mut out = borsh::to_vec(&head)?;
        tail.serialize(&mut out)?;
        if out.len() < METADATA_ACCOUNT_LEN {
            out.resize(METADATA_ACCOUNT_LEN, 0);
        }
        Ok(out)
    }

    /// Returns `true` if the token is a verified member of `collection`.
    #[must_use]
    pub fn in_verified_collection(&self, collection: &Pubkey) -> bool {
        self.collection
            .is_some_and(|c| c.verified && c.key == *collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_metadata(mint: &Pubkey, collection: Option<Collection>) -> Vec<u8> {
        TokenMetadata {
            update_authority: Pubkey::new_unique(),
            mint: *mint,
            name: "Pass #1\0\0\0".into(),
            symbol: "PASS".into(),
            uri: "https://example.com/1.json".into(),
            collection,
        }
        .to_account_data()
        .unwrap()
    }

    #[test]
    fn test_parse_verified_collection() {
        let mint = Pubkey::new_unique();
        let key = Pubkey::new_unique();
        let data = encode_metadata(
            &mint,
            Some(Collection {
                verified: true,
                key,
            }),
        );
        let metadata = TokenMetadata::parse(&data).unwrap();
        assert_eq!(metadata.mint, mint);
        assert_eq!(metadata.name, "Pass #1");
        assert_eq!(metadata.symbol, "PASS");
        assert!(metadata.in_verified_collection(&key));
        assert!(!metadata.in_verified_collection(&Pubkey::new_unique()));
    }

    #[test]
    fn test_unverified_collection_is_not_membership() {
        let key = Pubkey::new_unique();
        let data = encode_metadata(
            &Pubkey::new_unique(),
            Some(Collection {
                verified: false,
                key,
            }),
        );
        let metadata = TokenMetadata::parse(&data).unwrap();
        assert_eq!(
            metadata.collection,
            Some(Collection {
                verified: false,
                key
            })
        );
        assert!(!metadata.in_verified_collection(&key));
    }

    #[test]
    fn test_parse_without_collection() {
        let data = encode_metadata(&Pubkey::new_unique(), None);
        assert_eq!(TokenMetadata::parse(&data).unwrap().collection, None);
    }

    #[test]
    fn test_parse_truncated_legacy_account() {
        let key = Pubkey::new_unique();
        let mut data = encode_metadata(
            &Pubkey::new_unique(),
            Some(Collection {
                verified: true,
                key,
            }),
        );
        // Cut right after `is_mutable`, before any appended field.
        let head_len = 1 + 32 + 32 + (4 + 10) + (4 + 4) + (4 + 26) + 2 + 1 + 2;
        data.truncate(head_len);
        let metadata = TokenMetadata::parse(&data).unwrap();
        assert_eq!(metadata.name, "Pass #1");
        assert_eq!(metadata.collection, None);
    }

    #[test]
    fn test_parse_rejects_truncated_head() {
        let mut data = encode_metadata(&Pubkey::new_unique(), None);
        data.truncate(1 + 32 + 32 + 3);
        assert_eq!(TokenMetadata::parse(&data), None);
    }

    #[test]
    fn test_parse_skips_creators() {
        let key = Pubkey::new_unique();
        let mut head = borsh::to_vec(&MetadataLayout {
            key: METADATA_V1_KEY,
            update_authority: [1; 32],
            mint: [2; 32],
            data: DataLayout {
                name: "Pass #2".into(),
                symbol: "PASS".into(),
                uri: String::new(),
                seller_fee_basis_points: 500,
                creators: Some(vec![CreatorLayout {
                    address: [3; 32],
                    verified: true,
                    share: 100,
                }]),
            },
            primary_sale_happened: true,
            is_mutable: false,
        })
        .unwrap();
        let tail = (
            Some(254u8),
            Some(0u8),
            Some(CollectionLayout {
                verified: true,
                key: key.to_bytes(),
            }),
        );
        head.extend(borsh::to_vec(&tail).unwrap());

        let metadata = TokenMetadata::parse(&head).unwrap();
        assert_eq!(metadata.name, "Pass #2");
        assert_eq!(metadata.mint, Pubkey::new_from_array([2; 32]));
        assert!(metadata.in_verified_collection(&key));
    }

    #[test]
    fn test_account_data_has_allocated_length() {
        let data = encode_metadata(&Pubkey::new_unique(), None);
        assert_eq!(data.len(), METADATA_ACCOUNT_LEN);
    }

    #[test]
    fn test_parse_rejects_other_accounts() {
        assert_eq!(TokenMetadata::parse(&[]), None);
        assert_eq!(TokenMetadata::parse(&[6; 200]), None);
    }

    #[test]
    fn test_metadata_address_is_deterministic() {
        let mint = Pubkey::new_unique();
        assert_eq!(metadata_address(&mint), metadata_address(&mint));
        assert_ne!(metadata_address(&mint), metadata_address(&Pubkey::new_unique()));
    }
}
