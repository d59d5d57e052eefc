//! Network status codes and consensus outcomes.

use core::fmt;

use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::transaction::{AccountAmount, Timestamp, TransactionId};

/// A status reported by a gateway node or by consensus.
///
/// The full catalog of codes belongs to the network; only the codes the
/// submission pipeline reasons about are named here; all others pass through
/// untouched.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub struct ResponseCode(pub u32);

impl ResponseCode {
    /// Precheck passed.
    pub const OK: Self = Self(0);
    /// Malformed or otherwise unacceptable transaction.
    pub const INVALID_TRANSACTION: Self = Self(1);
    /// The transaction's validity window already closed.
    pub const TRANSACTION_EXPIRED: Self = Self(4);
    /// The valid start time is in the future from the node's point of view.
    pub const INVALID_TRANSACTION_START: Self = Self(5);
    /// A required signature is missing or wrong.
    pub const INVALID_SIGNATURE: Self = Self(7);
    /// The fee limit is below what the node requires.
    pub const INSUFFICIENT_TX_FEE: Self = Self(9);
    /// The payer cannot cover the fee.
    pub const INSUFFICIENT_PAYER_BALANCE: Self = Self(10);
    /// A transaction with this id was already submitted.
    pub const DUPLICATE_TRANSACTION: Self = Self(11);
    /// The node is too busy to accept the transaction right now.
    pub const BUSY: Self = Self(12);
    /// No receipt is known for the transaction id.
    pub const RECEIPT_NOT_FOUND: Self = Self(18);
    /// No record is known for the transaction id.
    pub const RECORD_NOT_FOUND: Self = Self(19);
    /// Consensus has not been reached yet.
    pub const UNKNOWN: Self = Self(21);
    /// The transaction executed successfully.
    pub const SUCCESS: Self = Self(22);
    /// The node failed to hand the transaction to the platform.
    pub const PLATFORM_TRANSACTION_NOT_CREATED: Self = Self(33);
    /// The node has not finished starting up.
    pub const PLATFORM_NOT_ACTIVE: Self = Self(34);

    /// Whether this is [`ResponseCode::SUCCESS`].
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Short human readable name, when the code is one of the named constants.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::OK => "OK",
            Self::INVALID_TRANSACTION => "INVALID_TRANSACTION",
            Self::TRANSACTION_EXPIRED => "TRANSACTION_EXPIRED",
            Self::INVALID_TRANSACTION_START => "INVALID_TRANSACTION_START",
            Self::INVALID_SIGNATURE => "INVALID_SIGNATURE",
            Self::INSUFFICIENT_TX_FEE => "INSUFFICIENT_TX_FEE",
            Self::INSUFFICIENT_PAYER_BALANCE => "INSUFFICIENT_PAYER_BALANCE",
            Self::DUPLICATE_TRANSACTION => "DUPLICATE_TRANSACTION",
            Self::BUSY => "BUSY",
            Self::RECEIPT_NOT_FOUND => "RECEIPT_NOT_FOUND",
            Self::RECORD_NOT_FOUND => "RECORD_NOT_FOUND",
            Self::UNKNOWN => "UNKNOWN",
            Self::SUCCESS => "SUCCESS",
            Self::PLATFORM_TRANSACTION_NOT_CREATED => "PLATFORM_TRANSACTION_NOT_CREATED",
            Self::PLATFORM_NOT_ACTIVE => "PLATFORM_NOT_ACTIVE",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "CODE_{}", self.0),
        }
    }
}

/// The minimal consensus outcome of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Receipt {
    /// The transaction this receipt belongs to.
    pub transaction_id: TransactionId,
    /// Consensus status; [`ResponseCode::UNKNOWN`] while still pending.
    pub status: ResponseCode,
}

/// The detailed consensus outcome of a transaction, obtained through a billed query.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Record {
    /// The receipt embedded in the record.
    pub receipt: Receipt,
    /// Hash of the signed transaction bytes.
    pub transaction_hash: Vec<u8>,
    /// When consensus was reached.
    pub consensus_timestamp: Timestamp,
    /// The memo submitted with the transaction.
    pub memo: String,
    /// The fee actually charged to the payer.
    pub fee_charged: u64,
    /// All balance changes caused by the transaction.
    pub transfers: Vec<AccountAmount>,
}

/// A gateway's answer to a billed record query.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct RecordAnswer {
    /// Precheck status of the query payment.
    pub precheck: ResponseCode,
    /// The record, present when the precheck passed.
    pub record: Option<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_codes_display_their_name_and_others_their_number() {
        assert_eq!(ResponseCode::BUSY.to_string(), "BUSY");
        assert_eq!(ResponseCode(4242).to_string(), "CODE_4242");
        assert!(ResponseCode::SUCCESS.is_success());
        assert!(!ResponseCode::OK.is_success());
    }
}
