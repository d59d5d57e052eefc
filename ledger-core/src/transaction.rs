//! Wire types for transaction envelopes.
//!
//! All types are SCALE encoded. The encoding of [`TransactionBody`] is the
//! exact byte string every signatory signs.

use core::fmt;
use core::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::key::KeyType;

/// A `shard.realm.num` entity address.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Encode,
    Decode,
    Serialize,
    Deserialize,
)]
pub struct AccountId {
    /// Shard number.
    pub shard: u64,
    /// Realm number.
    pub realm: u64,
    /// Account number.
    pub num: u64,
}

impl AccountId {
    /// Creates an address from its three components.
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

/// Error returned when an address is not of the form `shard.realm.num`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAccountIdError(pub String);

impl fmt::Display for ParseAccountIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a shard.realm.num address", self.0)
    }
}

impl std::error::Error for ParseAccountIdError {}

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('.')
            .map(u64::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParseAccountIdError(s.to_string()))?;
        match parts.as_slice() {
            [shard, realm, num] => Ok(AccountId::new(*shard, *realm, *num)),
            _ => Err(ParseAccountIdError(s.to_string())),
        }
    }
}

/// Seconds and nanoseconds since the unix epoch.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Encode,
    Decode,
    Serialize,
    Deserialize,
)]
pub struct Timestamp {
    /// Whole seconds.
    pub seconds: i64,
    /// Nanoseconds within the second.
    pub nanos: i32,
}

impl Timestamp {
    /// Builds a timestamp from nanoseconds since the epoch.
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            seconds: nanos.div_euclid(1_000_000_000),
            nanos: nanos.rem_euclid(1_000_000_000) as i32,
        }
    }

    /// Nanoseconds since the epoch.
    pub fn as_nanos(&self) -> i64 {
        self.seconds * 1_000_000_000 + i64::from(self.nanos)
    }

    /// Converts to a [`SystemTime`], clamping pre-epoch values to the epoch.
    pub fn to_system_time(&self) -> SystemTime {
        u64::try_from(self.as_nanos())
            .map(|nanos| UNIX_EPOCH + Duration::from_nanos(nanos))
            .unwrap_or(UNIX_EPOCH)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

/// Identifies a transaction by its payer and the start of its validity window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct TransactionId {
    /// The account paying for the transaction.
    pub payer: AccountId,
    /// When the transaction becomes valid; unique per payer.
    pub valid_start: Timestamp,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.payer, self.valid_start)
    }
}

/// A signed change in an account's balance.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct AccountAmount {
    /// The account whose balance changes.
    pub account: AccountId,
    /// The change, negative for debits.
    pub amount: i64,
}

/// A balanced set of balance changes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct TransferList {
    /// The individual balance changes.
    pub transfers: Vec<AccountAmount>,
}

impl TransferList {
    /// A transfer of `amount` from one account to another.
    ///
    /// Returns `None` when `amount` has no negation, i.e. for `i64::MIN`.
    pub fn between(from: AccountId, to: AccountId, amount: i64) -> Option<Self> {
        let debit = amount.checked_neg()?;
        Some(Self {
            transfers: vec![
                AccountAmount {
                    account: from,
                    amount: debit,
                },
                AccountAmount {
                    account: to,
                    amount,
                },
            ],
        })
    }
}

/// The operation specific part of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum TransactionData {
    /// Move value between accounts.
    CryptoTransfer(TransferList),
    /// Payment attached to a billed query.
    QueryPayment(TransferList),
    /// An already serialized operation produced elsewhere.
    Opaque(Vec<u8>),
}

/// Everything a transaction commits to; its encoding is what gets signed.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct TransactionBody {
    /// Unique identifier of this attempt.
    pub transaction_id: TransactionId,
    /// The gateway node account the transaction is addressed to.
    pub node: AccountId,
    /// Maximum fee the payer is willing to pay.
    pub fee_limit: u64,
    /// Length of the validity window in seconds.
    pub valid_duration_seconds: u64,
    /// Free-form memo.
    pub memo: String,
    /// The operation.
    pub data: TransactionData,
}

/// One entry of a signature map.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SignaturePair {
    /// Algorithm that produced `signature`.
    pub key_type: KeyType,
    /// Possibly truncated prefix identifying the signing key.
    pub pub_key_prefix: Vec<u8>,
    /// The signature bytes.
    pub signature: Vec<u8>,
}

/// The canonical set of signatures attached to a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct SignatureMap {
    /// Signature pairs in contribution order.
    pub pairs: Vec<SignaturePair>,
}

/// A signed transaction as it is sent to a gateway node.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SignedTransaction {
    /// The SCALE encoding of the [`TransactionBody`].
    pub body_bytes: Vec<u8>,
    /// Signatures over `body_bytes`.
    pub sig_map: SignatureMap,
}

impl SignedTransaction {
    /// Decodes the body this envelope carries.
    pub fn body(&self) -> Result<TransactionBody, codec::Error> {
        TransactionBody::decode(&mut self.body_bytes.as_slice())
    }
}
