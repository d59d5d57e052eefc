use snafu::Snafu;

use crate::key::KeyType;

/// Errors raised while constructing endorsements or signatories.
///
/// Every variant is produced at construction time so that malformed key
/// material is rejected before any request is built.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum KeyError {
    /// The supplied bytes could not be parsed as a key of the requested type.
    #[snafu(display("Invalid {key_type} key: {reason}"))]
    InvalidKeyFormat {
        /// The key type the bytes were parsed as.
        key_type: KeyType,
        /// Why parsing failed.
        reason: String,
    },

    /// The key type cannot be constructed from raw private key bytes.
    #[snafu(display(
        "{key_type} private keys are not supported directly, wrap the signer in Signatory::callback instead"
    ))]
    UnsupportedKeyType {
        /// The rejected key type.
        key_type: KeyType,
    },

    /// A threshold endorsement was given a required count outside `1..=children`.
    #[snafu(display(
        "Threshold of {required} is out of range for a list of {children} endorsements"
    ))]
    ThresholdOutOfRange {
        /// The requested number of required signatures.
        required: u32,
        /// The number of child endorsements supplied.
        children: usize,
    },

    /// A list endorsement or signatory was constructed without children.
    #[snafu(display("At least one child key is required"))]
    EmptyKeyList,
}

/// Errors raised while driving a [`crate::Signatory`] over an [`crate::Invoice`].
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum SigningError {
    /// A callback or delegated signer refused to sign.
    #[snafu(display("Signer rejected the request: {reason}"))]
    Rejected {
        /// Message supplied by the signer.
        reason: String,
    },

    /// Signing completed without a single signature being contributed.
    #[snafu(display("No signatures were contributed to the transaction"))]
    NoSignatures,
}
