//! JSON wire types of the transaction-request endpoint.
//!
//! | Exchange | Request | Response |
//! |---|---|---|
//! | `GET <link>` | - | [`TransactionMetadata`] |
//! | `POST <link>` | [`TransactionRequestBody`] | [`TransactionResponse`] |
//! | any failure | - | [`ErrorResponse`] |

use serde::{Deserialize, Serialize};
use url::Url;

use crate::encoding::Base64Blob;

/// Image extensions accepted for the endpoint icon.
pub const ICON_EXTENSIONS: &[&str] = &["svg", "png", "webp", "jpg", "jpeg"];

/// Self-description returned by `GET <link>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Short label shown by the wallet, usually the merchant name.
    pub label: String,
    /// Absolute URL of an image representing the endpoint.
    pub icon: Url,
}

/// Reasons a [`TransactionMetadata`] is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// The label is empty.
    #[error("label must not be empty")]
    EmptyLabel,
    /// The icon URL is not an absolute http(s) URL.
    #[error("icon must be an absolute http(s) URL: {0}")]
    IconNotHttp(String),
    /// The icon URL does not reference an image resource.
    #[error("icon must reference an image ({exts}): {0}", exts = ICON_EXTENSIONS.join(", "))]
    IconNotImage(String),
}

impl TransactionMetadata {
    /// Creates validated metadata.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] if the label is empty or the icon does not
    /// point at an image over http(s).
    pub fn new(label: impl Into<String>, icon: Url) -> Result<Self, MetadataError> {
        let metadata = Self {
            label: label.into(),
            icon,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Checks the label and icon constraints.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.label.trim().is_empty() {
            return Err(MetadataError::EmptyLabel);
        }
        if !matches!(self.icon.scheme(), "http" | "https") {
            return Err(MetadataError::IconNotHttp(self.icon.to_string()));
        }
        let extension = self
            .icon
            .path()
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension {
            Some(ext) if ICON_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            _ => Err(MetadataError::IconNotImage(self.icon.to_string())),
        }
    }
}

/// Body of `POST <link>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequestBody {
    /// Base58 address of the wallet account that will pay the fees.
    pub account: String,
}

/// Response of `POST <link>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    /// Base64 of the serialized, partially signed or unsigned transaction.
    pub transaction: Base64Blob,
    /// Optional human-readable message describing the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error body returned with any non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable description of the failure.
    pub error: String,
}

impl ErrorResponse {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        s.parse().unwrap()
    }

    #[test]
    fn test_metadata_accepts_image_icons() {
        for icon in [
            "https://example.com/icon.svg",
            "https://example.com/a/b/logo.PNG",
            "http://localhost:3000/icon.webp",
        ] {
            assert!(TransactionMetadata::new("Shop", url(icon)).is_ok(), "{icon}");
        }
    }

    #[test]
    fn test_metadata_rejects_bad_fields() {
        assert_eq!(
            TransactionMetadata::new("  ", url("https://example.com/icon.png")),
            Err(MetadataError::EmptyLabel)
        );
        assert!(matches!(
            TransactionMetadata::new("Shop", url("https://example.com/icon")),
            Err(MetadataError::IconNotImage(_))
        ));
        assert!(matches!(
            TransactionMetadata::new("Shop", url("ftp://example.com/icon.png")),
            Err(MetadataError::IconNotHttp(_))
        ));
    }

    #[test]
    fn test_transaction_response_omits_missing_message() {
        let response = TransactionResponse {
            transaction: Base64Blob::from("AQID"),
            message: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "transaction": "AQID" }));
    }

    #[test]
    fn test_request_body_requires_account() {
        let result: Result<TransactionRequestBody, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }
}
