//! Per-request signature accumulation and signature map canonicalization.

use crate::error::SigningError;
use crate::key::KeyType;
use crate::transaction::{SignatureMap, SignaturePair, TransactionId};

/// A single raw contribution, kept at full length until generation.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Contribution {
    key_type: KeyType,
    prefix: Vec<u8>,
    signature: Vec<u8>,
}

/// The in-flight request presented to signatories.
///
/// An invoice exposes the bytes to sign together with the transaction id and
/// memo, and accumulates signatures contributed by a [`crate::Signatory`] walk.
/// [`Invoice::generate`] consumes it and produces the minimal signature map.
#[derive(Debug)]
pub struct Invoice {
    transaction_id: TransactionId,
    memo: String,
    tx_bytes: Vec<u8>,
    trim_limit: usize,
    contributions: Vec<Contribution>,
}

impl Invoice {
    /// Creates an invoice for the given serialized body.
    ///
    /// `trim_limit` caps the length of emitted key prefixes; zero disables trimming.
    pub fn new(
        transaction_id: TransactionId,
        memo: impl Into<String>,
        tx_bytes: Vec<u8>,
        trim_limit: usize,
    ) -> Self {
        Self {
            transaction_id,
            memo: memo.into(),
            tx_bytes,
            trim_limit,
            contributions: Vec::new(),
        }
    }

    /// The id of the transaction being signed.
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    /// The memo of the transaction being signed.
    pub fn memo(&self) -> &str {
        &self.memo
    }

    /// The exact bytes every signature must cover.
    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx_bytes
    }

    /// Number of distinct contributions received so far.
    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    /// Whether nothing has been contributed yet.
    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// Records a signature contribution.
    ///
    /// `prefix` is normally the signer's public key but is treated as opaque
    /// bytes; it is never parsed. Exact duplicates of an earlier
    /// `(key_type, prefix, signature)` triple are ignored.
    pub fn add_signature(&mut self, key_type: KeyType, prefix: &[u8], signature: &[u8]) {
        let duplicate = self.contributions.iter().any(|existing| {
            existing.key_type == key_type
                && existing.prefix == prefix
                && existing.signature == signature
        });
        if !duplicate {
            self.contributions.push(Contribution {
                key_type,
                prefix: prefix.to_vec(),
                signature: signature.to_vec(),
            });
        }
    }

    /// Produces the wire signature map.
    ///
    /// With a zero trim limit every prefix is emitted in full, except that a
    /// lone signature gets an empty prefix. Otherwise each prefix is cut to the
    /// shortest length, at most the trim limit, that tells it apart from every
    /// other prefix; prefixes that still collide at the limit are emitted at
    /// the limit.
    pub fn generate(self) -> Result<SignatureMap, SigningError> {
        if self.contributions.is_empty() {
            return Err(SigningError::NoSignatures);
        }

        let lengths: Vec<usize> = if self.trim_limit == 0 {
            if self.contributions.len() == 1 {
                vec![0]
            } else {
                self.contributions.iter().map(|c| c.prefix.len()).collect()
            }
        } else {
            (0..self.contributions.len())
                .map(|index| self.unique_prefix_len(index))
                .collect()
        };

        let pairs = self
            .contributions
            .into_iter()
            .zip(lengths)
            .map(|(contribution, length)| SignaturePair {
                key_type: contribution.key_type,
                pub_key_prefix: contribution.prefix[..length].to_vec(),
                signature: contribution.signature,
            })
            .collect();

        Ok(SignatureMap { pairs })
    }

    /// Shortest length in `1..=min(trim_limit, len)` at which the prefix of
    /// contribution `index` differs from every other contribution's prefix.
    fn unique_prefix_len(&self, index: usize) -> usize {
        let prefix = &self.contributions[index].prefix;
        let max_len = self.trim_limit.min(prefix.len());

        (1..=max_len)
            .find(|&length| {
                self.contributions
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != index)
                    .all(|(_, other)| {
                        let other_len = length.min(other.prefix.len());
                        prefix[..length] != other.prefix[..other_len]
                    })
            })
            .unwrap_or(max_len)
    }
}
