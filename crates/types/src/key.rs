use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of raw bytes in a peer public key.
pub const PUBLIC_KEY_BYTES: usize = 32;

/// Errors that can occur when decoding a peer public key.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("public key must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("public key is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("public key is not a valid Ed25519 point")]
    InvalidPoint,
}

/// Ed25519 public key naming a peer.
///
/// Serialised as a lowercase hex string so records stay readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(pub [u8; PUBLIC_KEY_BYTES]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_BYTES] {
        &self.0
    }

    /// Decode a key from an arbitrary byte slice, e.g. a stored index value.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let raw: [u8; PUBLIC_KEY_BYTES] =
            bytes.try_into().map_err(|_| KeyError::InvalidLength {
                expected: PUBLIC_KEY_BYTES,
                actual: bytes.len(),
            })?;
        Ok(Self(raw))
    }

    pub fn from_hex(value: &str) -> Result<Self, KeyError> {
        let decoded = hex::decode(value)?;
        Self::from_slice(&decoded)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Interpret the key as an Ed25519 verifying key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| KeyError::InvalidPoint)
    }
}

impl From<[u8; PUBLIC_KEY_BYTES]> for PublicKey {
    fn from(value: [u8; PUBLIC_KEY_BYTES]) -> Self {
        Self(value)
    }
}

impl From<&VerifyingKey> for PublicKey {
    fn from(value: &VerifyingKey) -> Self {
        Self(value.to_bytes())
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(value: VerifyingKey) -> Self {
        Self(value.to_bytes())
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Short form; `Display` prints the whole key.
impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}…)", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn hex_form_is_accepted_back() {
        let key = PublicKey::from_bytes([0xAB; PUBLIC_KEY_BYTES]);
        let parsed = PublicKey::from_hex(&key.to_hex()).expect("hex decodes");
        assert_eq!(parsed, key);
    }

    #[test]
    fn short_slice_rejected() {
        let err = PublicKey::from_slice(&[1u8; 31]).unwrap_err();
        assert!(matches!(
            err,
            KeyError::InvalidLength {
                expected: 32,
                actual: 31
            }
        ));
    }

    #[test]
    fn invalid_hex_rejected() {
        let err = PublicKey::from_hex(&"zz".repeat(PUBLIC_KEY_BYTES)).unwrap_err();
        assert!(matches!(err, KeyError::InvalidHex(_)));
    }

    #[test]
    fn dalek_key_converts() {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let verifying = signing.verifying_key();
        let key = PublicKey::from(&verifying);
        assert_eq!(key.verifying_key().expect("valid point"), verifying);
    }

    #[test]
    fn serialises_as_hex_string() {
        let key = PublicKey::from_bytes([7u8; PUBLIC_KEY_BYTES]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(PUBLIC_KEY_BYTES)));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
