//! Signing requirements attached to ledger entities.

use core::fmt;

use crate::error::KeyError;
use crate::key::{KeyType, PublicKey};

/// Describes who must sign for an account, file or token.
///
/// An endorsement is either a single public key or an N-of-M threshold over
/// nested endorsements. Endorsements are immutable once built and compare
/// structurally, child order included. They express requirements only and are
/// never used to produce signatures, see [`crate::Signatory`] for that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endorsement {
    /// A single public key.
    Key(PublicKey),
    /// At least `required` of `children` must be satisfied.
    Threshold(ThresholdKey),
}

/// A validated N-of-M requirement, only obtainable from [`Endorsement::threshold`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdKey {
    required: u32,
    children: Vec<Endorsement>,
}

impl ThresholdKey {
    /// Number of children that must be satisfied, between one and the child count.
    pub fn required(&self) -> u32 {
        self.required
    }

    /// The nested requirements, never empty.
    pub fn children(&self) -> &[Endorsement] {
        &self.children
    }
}

impl Endorsement {
    /// Parses `bytes` as a public key of `key_type`, failing fast on bad input.
    pub fn single_key(key_type: KeyType, bytes: &[u8]) -> Result<Self, KeyError> {
        PublicKey::from_bytes(key_type, bytes).map(Endorsement::Key)
    }

    /// Builds an N-of-M requirement.
    ///
    /// `required` must be between one and the number of children, and at least
    /// one child must be supplied.
    pub fn threshold(required: u32, children: Vec<Endorsement>) -> Result<Self, KeyError> {
        if children.is_empty() {
            return Err(KeyError::EmptyKeyList);
        }
        if required == 0 || required as usize > children.len() {
            return Err(KeyError::ThresholdOutOfRange {
                required,
                children: children.len(),
            });
        }
        Ok(Endorsement::Threshold(ThresholdKey { required, children }))
    }

    /// Builds a requirement in which every child must be satisfied.
    pub fn list(children: Vec<Endorsement>) -> Result<Self, KeyError> {
        let required = u32::try_from(children.len()).map_err(|_| KeyError::ThresholdOutOfRange {
            required: u32::MAX,
            children: children.len(),
        })?;
        Self::threshold(required, children)
    }

    /// Iterates every leaf key of the tree, depth first, in declaration order.
    pub fn public_keys(&self) -> Vec<&PublicKey> {
        match self {
            Endorsement::Key(key) => vec![key],
            Endorsement::Threshold(threshold) => {
                threshold.children.iter().flat_map(Endorsement::public_keys).collect()
            }
        }
    }
}

impl From<PublicKey> for Endorsement {
    fn from(key: PublicKey) -> Self {
        Endorsement::Key(key)
    }
}

impl fmt::Display for Endorsement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endorsement::Key(key) => write!(f, "{key}"),
            Endorsement::Threshold(threshold) => {
                write!(f, "{}-of-{}[", threshold.required, threshold.children.len())?;
                for (index, child) in threshold.children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ed25519_endorsement(seed: u8) -> Endorsement {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]);
        Endorsement::single_key(KeyType::Ed25519, signing.verifying_key().as_bytes()).unwrap()
    }

    #[test]
    fn we_cannot_build_a_threshold_with_zero_required() {
        let children = vec![ed25519_endorsement(1), ed25519_endorsement(2)];
        assert_eq!(
            Endorsement::threshold(0, children),
            Err(KeyError::ThresholdOutOfRange {
                required: 0,
                children: 2
            })
        );
    }

    #[test]
    fn we_cannot_build_a_threshold_requiring_more_than_its_children() {
        let children = vec![ed25519_endorsement(1), ed25519_endorsement(2)];
        assert!(matches!(
            Endorsement::threshold(3, children),
            Err(KeyError::ThresholdOutOfRange { required: 3, .. })
        ));
    }

    #[test]
    fn we_cannot_build_an_empty_threshold() {
        assert_eq!(
            Endorsement::threshold(1, vec![]),
            Err(KeyError::EmptyKeyList)
        );
    }

    #[test]
    fn we_can_build_a_full_threshold_that_round_trips_through_equality() {
        let children = vec![
            ed25519_endorsement(1),
            ed25519_endorsement(2),
            ed25519_endorsement(3),
        ];
        let all_of = Endorsement::threshold(3, children.clone()).unwrap();

        assert_eq!(all_of, Endorsement::list(children.clone()).unwrap());
        assert_eq!(all_of, all_of.clone());
        assert_eq!(all_of.public_keys().len(), 3);
    }

    #[test]
    fn equality_is_sensitive_to_child_order_and_threshold() {
        let a = ed25519_endorsement(1);
        let b = ed25519_endorsement(2);

        let ab = Endorsement::threshold(1, vec![a.clone(), b.clone()]).unwrap();
        let ba = Endorsement::threshold(1, vec![b.clone(), a.clone()]).unwrap();
        let ab_all = Endorsement::threshold(2, vec![a, b]).unwrap();

        assert_ne!(ab, ba);
        assert_ne!(ab, ab_all);
    }

    #[test]
    fn nested_thresholds_compare_deeply() {
        let inner = Endorsement::threshold(1, vec![ed25519_endorsement(4), ed25519_endorsement(5)])
            .unwrap();
        let outer = Endorsement::threshold(2, vec![ed25519_endorsement(6), inner.clone()]).unwrap();
        let same = Endorsement::threshold(2, vec![ed25519_endorsement(6), inner]).unwrap();

        assert_eq!(outer, same);
        assert!(outer.to_string().starts_with("2-of-2["));
    }

    #[test]
    fn a_built_threshold_exposes_its_validated_parts() {
        let children = vec![ed25519_endorsement(1), ed25519_endorsement(2)];
        let endorsement = Endorsement::threshold(1, children.clone()).unwrap();

        let Endorsement::Threshold(threshold) = &endorsement else {
            panic!("expected a threshold, got {endorsement}");
        };
        assert_eq!(threshold.required(), 1);
        assert_eq!(threshold.children(), children.as_slice());
        assert_eq!(endorsement.to_string().matches("Ed25519").count(), 2);
    }
}
