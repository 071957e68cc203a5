//! Base64 transport encoding for transaction blobs.
//!
//! Transaction-request endpoints return serialized transactions as standard
//! base64 text inside JSON. [`Base64Blob`] keeps the text form as received and
//! decodes it on demand.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base64 text carrying an opaque binary payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Base64Blob(String);

impl Base64Blob {
    /// Encodes raw binary data.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Self {
        Self(b64.encode(input.as_ref()))
    }

    /// Decodes the blob into raw binary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Returns the base64 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the blob, returning the base64 text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Base64Blob {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Base64Blob {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

impl fmt::Display for Base64Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_standard_alphabet_with_padding() {
        let blob = Base64Blob::encode([0xfbu8, 0xff]);
        assert_eq!(blob.as_str(), "+/8=");
        assert_eq!(blob.decode().unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Base64Blob::from("not base64!").decode().is_err());
    }
}
