//! Signing capabilities and the recursive signing protocol.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{KeyError, SigningError};
use crate::invoice::Invoice;
use crate::key::{KeyType, PublicKey, ED25519_DER_PRIVATE_PREFIX};

/// User supplied signing function wrapped by [`Signatory::Callback`].
///
/// The function may add any number of signatures to the invoice, including
/// none. It can be invoked more than once for a single user-facing operation,
/// for example when a detailed record is fetched after submission.
pub type SigningCallback =
    dyn for<'a> Fn(&'a mut Invoice) -> BoxFuture<'a, Result<(), SigningError>> + Send + Sync;

/// A signer living outside this library, wrapped by [`Signatory::Delegate`].
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Adds this signer's signatures to `invoice`.
    async fn sign_invoice(&self, invoice: &mut Invoice) -> Result<(), SigningError>;
}

/// Describes how to produce signatures for a request.
///
/// Signatories mirror [`crate::Endorsement`] structurally but carry the
/// capability to sign instead of the requirement. They are immutable once
/// constructed and cheap to clone.
#[derive(Clone)]
pub enum Signatory {
    /// An Ed25519 private key held in memory.
    SingleKey(Arc<SigningKey>),
    /// An arbitrary asynchronous signing function.
    Callback(Arc<SigningCallback>),
    /// Several signatories, signed in order.
    List(SignatoryList),
    /// A signer implemented outside this library.
    Delegate(Arc<dyn ExternalSigner>),
}

/// A non-empty, ordered list of signatories, only obtainable from [`Signatory::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatoryList(Vec<Signatory>);

impl SignatoryList {
    /// The children, in signing order.
    pub fn children(&self) -> &[Signatory] {
        &self.0
    }
}

impl Signatory {
    /// Parses an Ed25519 private key, either a raw 32 byte seed or PKCS#8 DER.
    pub fn from_private_key(bytes: &[u8]) -> Result<Self, KeyError> {
        let raw = bytes.strip_prefix(&ED25519_DER_PRIVATE_PREFIX[..]).unwrap_or(bytes);
        let seed: [u8; 32] = raw.try_into().map_err(|_| KeyError::InvalidKeyFormat {
            key_type: KeyType::Ed25519,
            reason: format!("expected a 32 byte private key, got {} bytes", raw.len()),
        })?;
        Ok(Signatory::SingleKey(Arc::new(SigningKey::from_bytes(&seed))))
    }

    /// Parses a private key of an explicit type.
    ///
    /// Only Ed25519 keys can be held natively; every other type must be
    /// signed for through [`Signatory::callback`].
    pub fn single_key(key_type: KeyType, bytes: &[u8]) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Ed25519 => Self::from_private_key(bytes),
            other => Err(KeyError::UnsupportedKeyType { key_type: other }),
        }
    }

    /// Combines signatories that all sign, in order.
    pub fn list(children: Vec<Signatory>) -> Result<Self, KeyError> {
        if children.is_empty() {
            return Err(KeyError::EmptyKeyList);
        }
        Ok(Signatory::List(SignatoryList(children)))
    }

    /// Wraps an asynchronous signing function.
    pub fn callback<F>(callback: F) -> Self
    where
        F: for<'a> Fn(&'a mut Invoice) -> BoxFuture<'a, Result<(), SigningError>>
            + Send
            + Sync
            + 'static,
    {
        Signatory::Callback(Arc::new(callback))
    }

    /// Wraps an external signer.
    pub fn delegate(signer: impl ExternalSigner + 'static) -> Self {
        Signatory::Delegate(Arc::new(signer))
    }

    /// The public key of a [`Signatory::SingleKey`].
    pub fn public_key(&self) -> Option<PublicKey> {
        match self {
            Signatory::SingleKey(key) => Some(PublicKey::Ed25519(key.verifying_key())),
            _ => None,
        }
    }

    /// Adds this signatory's signatures over the invoice bytes to `invoice`.
    ///
    /// Children of a list are signed strictly one after the other; each child
    /// finishes before the next starts because they all write to the same invoice.
    pub fn sign<'a>(&'a self, invoice: &'a mut Invoice) -> BoxFuture<'a, Result<(), SigningError>> {
        async move {
            match self {
                Signatory::SingleKey(key) => {
                    let signature = key.sign(invoice.tx_bytes());
                    invoice.add_signature(
                        KeyType::Ed25519,
                        key.verifying_key().as_bytes(),
                        &signature.to_bytes(),
                    );
                    Ok(())
                }
                Signatory::List(list) => {
                    for child in list.children() {
                        child.sign(invoice).await?;
                    }
                    Ok(())
                }
                Signatory::Callback(callback) => callback(invoice).await,
                Signatory::Delegate(signer) => signer.sign_invoice(invoice).await,
            }
        }
        .boxed()
    }
}

#[async_trait]
impl ExternalSigner for Signatory {
    async fn sign_invoice(&self, invoice: &mut Invoice) -> Result<(), SigningError> {
        self.sign(invoice).await
    }
}

impl PartialEq for Signatory {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Signatory::SingleKey(a), Signatory::SingleKey(b)) => {
                a.verifying_key() == b.verifying_key()
            }
            (Signatory::Callback(a), Signatory::Callback(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Signatory::List(a), Signatory::List(b)) => a == b,
            (Signatory::Delegate(a), Signatory::Delegate(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl Eq for Signatory {}

impl fmt::Debug for Signatory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signatory::SingleKey(key) => f
                .debug_tuple("SingleKey")
                .field(&PublicKey::Ed25519(key.verifying_key()).to_string())
                .finish(),
            Signatory::Callback(_) => f.write_str("Callback"),
            Signatory::List(list) => f.debug_tuple("List").field(&list.0).finish(),
            Signatory::Delegate(_) => f.write_str("Delegate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ed25519_dalek::{Signature, Verifier};

    use super::*;
    use crate::transaction::{AccountId, Timestamp, TransactionId};

    fn invoice() -> Invoice {
        Invoice::new(
            TransactionId {
                payer: AccountId::new(0, 0, 2),
                valid_start: Timestamp::from_nanos(42),
            },
            "memo",
            b"body bytes".to_vec(),
            0,
        )
    }

    #[test]
    fn we_cannot_construct_a_signatory_from_a_short_key() {
        assert!(matches!(
            Signatory::from_private_key(&[1; 16]),
            Err(KeyError::InvalidKeyFormat { .. })
        ));
    }

    #[test]
    fn we_cannot_construct_a_secp256k1_signatory_from_raw_bytes() {
        assert_eq!(
            Signatory::single_key(KeyType::EcdsaSecp256k1, &[1; 32]),
            Err(KeyError::UnsupportedKeyType {
                key_type: KeyType::EcdsaSecp256k1
            })
        );
    }

    #[test]
    fn we_cannot_construct_an_empty_list() {
        assert_eq!(Signatory::list(vec![]), Err(KeyError::EmptyKeyList));
    }

    #[test]
    fn a_built_list_keeps_its_children_in_order() {
        let first = Signatory::from_private_key(&[1; 32]).unwrap();
        let second = Signatory::from_private_key(&[2; 32]).unwrap();

        let Signatory::List(list) = Signatory::list(vec![first.clone(), second.clone()]).unwrap()
        else {
            panic!("expected a list");
        };

        assert_eq!(list.children(), &[first, second]);
    }

    #[test]
    fn der_and_raw_private_keys_are_equal() {
        let der: Vec<u8> = ED25519_DER_PRIVATE_PREFIX
            .iter()
            .copied()
            .chain([3u8; 32])
            .collect();
        assert_eq!(
            Signatory::from_private_key(&der).unwrap(),
            Signatory::from_private_key(&[3; 32]).unwrap()
        );
        assert_ne!(
            Signatory::from_private_key(&[3; 32]).unwrap(),
            Signatory::from_private_key(&[4; 32]).unwrap()
        );
    }

    #[tokio::test]
    async fn a_single_key_adds_a_verifiable_signature() {
        let signatory = Signatory::from_private_key(&[5; 32]).unwrap();
        let public = SigningKey::from_bytes(&[5; 32]).verifying_key();

        let mut invoice = invoice();
        signatory.sign(&mut invoice).await.unwrap();
        let map = invoice.generate().unwrap();

        assert_eq!(map.pairs.len(), 1);
        let signature = Signature::from_slice(&map.pairs[0].signature).unwrap();
        assert!(public.verify(b"body bytes", &signature).is_ok());
    }

    #[tokio::test]
    async fn list_children_sign_in_order() {
        let recorded = Arc::new(AtomicUsize::new(0));
        let seen_before_callback = recorded.clone();
        let callback = Signatory::callback(move |invoice: &mut Invoice| {
            let seen = seen_before_callback.clone();
            async move {
                seen.store(invoice.len(), Ordering::SeqCst);
                invoice.add_signature(KeyType::EcdsaSecp256k1, b"embedded", b"custodial");
                Ok(())
            }
            .boxed()
        });
        let signatory = Signatory::list(vec![
            Signatory::from_private_key(&[1; 32]).unwrap(),
            Signatory::from_private_key(&[2; 32]).unwrap(),
            callback,
        ])
        .unwrap();

        let mut invoice = invoice();
        signatory.sign(&mut invoice).await.unwrap();

        assert_eq!(recorded.load(Ordering::SeqCst), 2);
        let map = invoice.generate().unwrap();
        assert_eq!(map.pairs.len(), 3);
        assert_eq!(map.pairs[2].pub_key_prefix, b"embedded".to_vec());
    }

    #[tokio::test]
    async fn a_callback_may_contribute_nothing() {
        let signatory = Signatory::callback(|_: &mut Invoice| async { Ok::<(), SigningError>(()) }.boxed());

        let mut invoice = invoice();
        signatory.sign(&mut invoice).await.unwrap();

        assert!(invoice.is_empty());
    }

    #[tokio::test]
    async fn callback_errors_stop_the_walk() {
        let signatory = Signatory::list(vec![
            Signatory::callback(|_: &mut Invoice| {
                async {
                    Err::<(), _>(SigningError::Rejected {
                        reason: "device unplugged".into(),
                    })
                }
                .boxed()
            }),
            Signatory::from_private_key(&[1; 32]).unwrap(),
        ])
        .unwrap();

        let mut invoice = invoice();
        let err = signatory.sign(&mut invoice).await.unwrap_err();

        assert!(matches!(err, SigningError::Rejected { .. }));
        assert!(invoice.is_empty());
    }

    struct CountingSigner(AtomicUsize);

    #[async_trait]
    impl ExternalSigner for CountingSigner {
        async fn sign_invoice(&self, invoice: &mut Invoice) -> Result<(), SigningError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            assert_eq!(invoice.memo(), "memo");
            Ok(())
        }
    }

    #[tokio::test]
    async fn delegates_forward_to_the_external_signer() {
        let signer = Arc::new(CountingSigner(AtomicUsize::new(0)));
        let signatory = Signatory::Delegate(signer.clone());

        signatory.sign(&mut invoice()).await.unwrap();
        signatory.sign(&mut invoice()).await.unwrap();

        assert_eq!(signer.0.load(Ordering::SeqCst), 2);
    }
}
