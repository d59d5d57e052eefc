use ledger_core::{KeyError, Receipt, ResponseCode, SigningError, TransactionId};
use snafu::Snafu;

/// Failures talking to a gateway node.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// Error when opening a connection to a gateway.
    #[snafu(display("Error connecting to gateway at '{url}': {source}"))]
    Connect {
        /// The gateway endpoint.
        url: String,
        /// The underlying error from the `jsonrpsee` client.
        source: jsonrpsee::core::ClientError,
    },

    /// Error returned by a gateway call.
    #[snafu(display("Gateway call {method} failed: {source}"))]
    Rpc {
        /// The JSON-RPC method that failed.
        method: &'static str,
        /// The underlying error from the `jsonrpsee` client.
        source: jsonrpsee::core::ClientError,
    },

    /// A gateway answered with a payload that is not hex.
    #[snafu(display("Gateway call {method} returned a non-hex payload: {source}"))]
    HexDecode {
        /// The JSON-RPC method whose answer was malformed.
        method: &'static str,
        /// The underlying hex parsing error.
        source: hex::FromHexError,
    },

    /// A gateway answered with bytes that are not a valid SCALE encoding.
    #[snafu(display("Gateway call {method} returned an undecodable payload: {source}"))]
    Decode {
        /// The JSON-RPC method whose answer was malformed.
        method: &'static str,
        /// The underlying codec error.
        source: codec::Error,
    },

    /// The gateway could not be reached for any other reason.
    #[snafu(display("Gateway unavailable: {message}"))]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Represents every way a ledger call can fail.
///
/// Variants are grouped by [`ErrorKind`] so callers can decide whether to
/// retry, inspect a pending transaction, or give up.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A required setting has no value anywhere in the context chain.
    ///
    /// Raised before any network traffic.
    #[snafu(display("Missing required setting: {setting}"))]
    Configuration {
        /// Name of the missing setting.
        setting: &'static str,
    },

    /// A transfer amount that cannot be represented as a balanced transfer.
    #[snafu(display("Invalid transfer amount: {amount}"))]
    InvalidAmount {
        /// The rejected amount.
        amount: i64,
    },

    /// Error when reading a private key from a file.
    #[snafu(display("Failed to read private key from file '{}': {}", path, source))]
    KeyFileRead {
        /// The path of the key file that could not be read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Error when parsing a key file as hex.
    #[snafu(display("Failed to parse private key as hex: {}", source))]
    KeyParse {
        /// The underlying hex parsing error.
        source: hex::FromHexError,
    },

    /// Key material was rejected.
    #[snafu(display("Invalid key: {source}"))]
    Key {
        /// The underlying key error.
        source: KeyError,
    },

    /// A signatory failed while signing.
    #[snafu(display("Signing failed: {source}"))]
    Signing {
        /// The underlying signing error.
        source: SigningError,
    },

    /// The gateway node rejected the request before consensus.
    #[snafu(display("Transaction {transaction_id} failed precheck with {status}"))]
    Precheck {
        /// Id of the rejected attempt.
        transaction_id: TransactionId,
        /// The precheck status.
        status: ResponseCode,
    },

    /// The transaction was accepted but no terminal receipt appeared before
    /// its validity window closed.
    #[snafu(display(
        "Transaction {transaction_id} is still pending after its validity window closed, last status {last_status}"
    ))]
    ConsensusTimeout {
        /// The accepted transaction.
        transaction_id: TransactionId,
        /// The last status observed while polling.
        last_status: ResponseCode,
    },

    /// Consensus was reached but the transaction did not succeed.
    #[snafu(display(
        "Transaction {} failed with {}",
        receipt.transaction_id,
        receipt.status
    ))]
    TransactionFailed {
        /// The full receipt.
        receipt: Receipt,
    },

    /// The gateway could not be reached, even after retrying.
    #[snafu(display("Transport failure: {source}"))]
    Transport {
        /// The final transport failure.
        source: TransportError,
    },
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing configuration or an invalid request.
    Configuration,
    /// Malformed or unsupported key material, or a failing signer.
    Key,
    /// Rejected by the gateway node before consensus.
    Precheck,
    /// Accepted, but the outcome is still unknown.
    ConsensusTimeout,
    /// Executed with a non-success outcome.
    Transaction,
    /// Connectivity failure.
    Transport,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } | Error::InvalidAmount { .. } => ErrorKind::Configuration,
            Error::KeyFileRead { .. }
            | Error::KeyParse { .. }
            | Error::Key { .. }
            | Error::Signing { .. } => ErrorKind::Key,
            Error::Precheck { .. } => ErrorKind::Precheck,
            Error::ConsensusTimeout { .. } => ErrorKind::ConsensusTimeout,
            Error::TransactionFailed { .. } => ErrorKind::Transaction,
            Error::Transport { .. } => ErrorKind::Transport,
        }
    }
}

/// Type alias for results that return a `Result<T, Error>`, simplifying error handling.
pub type Result<T, E = Error> = std::result::Result<T, E>;
