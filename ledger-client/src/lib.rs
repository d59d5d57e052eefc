//! # Ledger Client
//!
//! Submits signed transactions to a ledger gateway and determines their
//! outcome. Every call is parameterized by a [`context::ConfigContext`],
//! signed through the [`ledger_core::Signatory`] tree and driven to a
//! terminal receipt by the [`pipeline::SubmissionPipeline`].

/// Error handling module.
///
/// Defines the `snafu` error types for configuration, signing, precheck,
/// consensus and transport failures, and the [`error::ErrorKind`] used to
/// classify them.
pub mod error;

/// Gateway transport.
///
/// The [`channel::NodeChannel`] seam and its JSON-RPC WebSocket implementation.
pub mod channel;

/// Hierarchical configuration frames and the per-frame connection cache.
pub mod context;

/// Transaction submission module.
///
/// Builds, signs and submits transactions, retries transient rejections, and
/// polls for consensus within the transaction's validity window.
pub mod pipeline;

/// Client facade.
pub mod client;

/// Cryptographic signer module.
///
/// Provides functionality for loading Ed25519 keys from disk.
pub mod signer;

pub use client::Client;
pub use context::{ConfigContext, Gateway, RequestHook, Setting, SettingKey};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{PipelineState, SubmissionPipeline, TransactionOutcome};
