//! # Ledger Core
//!
//! Types shared by every part of the ledger client: keys, signing
//! requirements and capabilities, signature map construction, and the
//! SCALE encoded wire types of a transaction envelope.

/// Key and signing errors.
///
/// Defines the `snafu` error types raised when key material is malformed or
/// a signatory fails to sign.
pub mod error;

/// Key types and public key parsing.
pub mod key;

/// Signing requirements (single keys and N-of-M thresholds).
pub mod endorsement;

/// Signing capabilities and the sequential signing protocol.
pub mod signatory;

/// The per-request signature accumulator.
///
/// Collects raw signature contributions, removes duplicates and emits the
/// minimal, disambiguated signature map sent on the wire.
pub mod invoice;

/// Transaction envelope wire types.
pub mod transaction;

/// Network status codes, receipts and records.
pub mod response;

pub use endorsement::{Endorsement, ThresholdKey};
pub use error::{KeyError, SigningError};
pub use invoice::Invoice;
pub use key::{KeyType, PublicKey};
pub use response::{Receipt, Record, RecordAnswer, ResponseCode};
pub use signatory::{ExternalSigner, Signatory, SignatoryList};
pub use transaction::{
    AccountAmount,
    AccountId,
    SignatureMap,
    SignaturePair,
    SignedTransaction,
    Timestamp,
    TransactionBody,
    TransactionData,
    TransactionId,
    TransferList,
};
