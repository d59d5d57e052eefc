//! Key types and public key parsing shared by endorsements and signatures.

use core::fmt;

use codec::{Decode, Encode};
use ed25519_dalek::VerifyingKey as Ed25519VerifyingKey;
use k256::ecdsa::VerifyingKey as Secp256k1VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// DER `SubjectPublicKeyInfo` header preceding a raw 32 byte Ed25519 public key.
pub const ED25519_DER_PUBLIC_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// DER `PrivateKeyInfo` (PKCS#8) header preceding a raw 32 byte Ed25519 seed.
pub const ED25519_DER_PRIVATE_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// The signature algorithms understood by the network.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub enum KeyType {
    /// Ed25519 keys, the only type this library can sign with natively.
    Ed25519,
    /// ECDSA keys over the secp256k1 curve.
    EcdsaSecp256k1,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Ed25519 => f.write_str("Ed25519"),
            KeyType::EcdsaSecp256k1 => f.write_str("ECDSA secp256k1"),
        }
    }
}

/// A parsed public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    /// An Ed25519 verifying key.
    Ed25519(Ed25519VerifyingKey),
    /// A secp256k1 ECDSA verifying key.
    EcdsaSecp256k1(Secp256k1VerifyingKey),
}

impl PublicKey {
    /// Parses `bytes` as a public key of `key_type`.
    ///
    /// Ed25519 keys may be given raw (32 bytes) or DER encoded. secp256k1 keys
    /// are accepted in SEC1 compressed or uncompressed form.
    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Ed25519 => {
                let raw = bytes.strip_prefix(&ED25519_DER_PUBLIC_PREFIX[..]).unwrap_or(bytes);
                let raw: [u8; 32] = raw.try_into().map_err(|_| KeyError::InvalidKeyFormat {
                    key_type,
                    reason: format!("expected 32 bytes, got {}", raw.len()),
                })?;
                Ed25519VerifyingKey::from_bytes(&raw)
                    .map(PublicKey::Ed25519)
                    .map_err(|err| KeyError::InvalidKeyFormat {
                        key_type,
                        reason: err.to_string(),
                    })
            }
            KeyType::EcdsaSecp256k1 => Secp256k1VerifyingKey::from_sec1_bytes(bytes)
                .map(PublicKey::EcdsaSecp256k1)
                .map_err(|err| KeyError::InvalidKeyFormat {
                    key_type,
                    reason: err.to_string(),
                }),
        }
    }

    /// The algorithm of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            PublicKey::Ed25519(_) => KeyType::Ed25519,
            PublicKey::EcdsaSecp256k1(_) => KeyType::EcdsaSecp256k1,
        }
    }

    /// Exports the key in the form used as a signature-map prefix.
    ///
    /// Ed25519 keys export their raw 32 bytes, secp256k1 keys their 33 byte
    /// compressed SEC1 point.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
            PublicKey::EcdsaSecp256k1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{}", self.key_type(), hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519_PUBLIC: [u8; 32] = [
        0xd7, 0x5a, 0x98, 0x01, 0x82, 0xb1, 0x0a, 0xb7, 0xd5, 0x4b, 0xfe, 0xd3, 0xc9, 0x64, 0x07,
        0x3a, 0x0e, 0xe1, 0x72, 0xf3, 0xda, 0xa6, 0x23, 0x25, 0xaf, 0x02, 0x1a, 0x68, 0xf7, 0x07,
        0x51, 0x1a,
    ];

    #[test]
    fn we_can_parse_raw_and_der_ed25519_keys_to_the_same_key() {
        let raw = PublicKey::from_bytes(KeyType::Ed25519, &ED25519_PUBLIC).unwrap();
        let der: Vec<u8> = ED25519_DER_PUBLIC_PREFIX
            .iter()
            .chain(ED25519_PUBLIC.iter())
            .copied()
            .collect();
        let der = PublicKey::from_bytes(KeyType::Ed25519, &der).unwrap();

        assert_eq!(raw, der);
        assert_eq!(raw.to_bytes(), ED25519_PUBLIC.to_vec());
    }

    #[test]
    fn we_cannot_parse_a_short_ed25519_key() {
        let err = PublicKey::from_bytes(KeyType::Ed25519, &ED25519_PUBLIC[..31]).unwrap_err();
        assert!(matches!(
            err,
            KeyError::InvalidKeyFormat {
                key_type: KeyType::Ed25519,
                ..
            }
        ));
    }

    #[test]
    fn we_can_parse_a_compressed_secp256k1_key() {
        let signing = k256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
        let compressed = signing.verifying_key().to_encoded_point(true);

        let key = PublicKey::from_bytes(KeyType::EcdsaSecp256k1, compressed.as_bytes()).unwrap();

        assert_eq!(key.key_type(), KeyType::EcdsaSecp256k1);
        assert_eq!(key.to_bytes(), compressed.as_bytes().to_vec());
    }

    #[test]
    fn we_cannot_parse_garbage_as_a_secp256k1_key() {
        assert!(PublicKey::from_bytes(KeyType::EcdsaSecp256k1, &[0x05; 33]).is_err());
    }
}
