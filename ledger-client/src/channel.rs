//! # Gateway Channels
//!
//! A channel is a connection to a single gateway node. The submission
//! pipeline only ever talks to the [`NodeChannel`] trait; the default
//! implementation speaks JSON-RPC over a WebSocket, with every payload a
//! `0x`-prefixed hex string of SCALE encoded bytes.
//!
//! | method | params | result |
//! |---|---|---|
//! | `ledger_submitTransaction` | signed envelope | precheck code (`u32`) |
//! | `ledger_getReceipt` | transaction id | receipt |
//! | `ledger_getRecord` | transaction id, payment envelope | record answer |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codec::{Decode, Encode};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::rpc_params;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use ledger_core::{Receipt, RecordAnswer, ResponseCode, SignedTransaction, TransactionId};
use log::info;
use snafu::ResultExt;

use crate::error::{ConnectSnafu, DecodeSnafu, HexDecodeSnafu, RpcSnafu, TransportError};

const SUBMIT_METHOD: &str = "ledger_submitTransaction";
const RECEIPT_METHOD: &str = "ledger_getReceipt";
const RECORD_METHOD: &str = "ledger_getRecord";

/// The operations the pipeline needs from a gateway node.
#[async_trait]
pub trait NodeChannel: Send + Sync {
    /// Sends a signed transaction and returns the node's precheck status.
    async fn submit_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<ResponseCode, TransportError>;

    /// Asks for the current receipt of a transaction.
    async fn get_receipt(&self, transaction_id: &TransactionId) -> Result<Receipt, TransportError>;

    /// Asks for the detailed record of a transaction, paying with `payment`.
    async fn get_record(
        &self,
        transaction_id: &TransactionId,
        payment: &SignedTransaction,
    ) -> Result<RecordAnswer, TransportError>;
}

/// Opens channels to gateway endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a channel to `url`.
    async fn connect(&self, url: &str) -> Result<Arc<dyn NodeChannel>, TransportError>;
}

/// Connects to gateways over JSON-RPC WebSockets.
#[derive(Clone, Debug)]
pub struct WsConnector {
    request_timeout: Duration,
    connection_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector with explicit timeouts.
    pub fn new(request_timeout: Duration, connection_timeout: Duration) -> Self {
        Self {
            request_timeout,
            connection_timeout,
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn NodeChannel>, TransportError> {
        info!("🔵 Connecting to gateway: {}", url);
        let client = WsClientBuilder::default()
            .request_timeout(self.request_timeout)
            .connection_timeout(self.connection_timeout)
            .build(url)
            .await
            .context(ConnectSnafu { url })?;
        Ok(Arc::new(WsChannel { client }))
    }
}

/// A JSON-RPC WebSocket connection to one gateway.
pub struct WsChannel {
    client: WsClient,
}

#[async_trait]
impl NodeChannel for WsChannel {
    async fn submit_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<ResponseCode, TransportError> {
        let code: u32 = self
            .client
            .request(SUBMIT_METHOD, rpc_params![to_hex(transaction)])
            .await
            .context(RpcSnafu {
                method: SUBMIT_METHOD,
            })?;
        Ok(ResponseCode(code))
    }

    async fn get_receipt(&self, transaction_id: &TransactionId) -> Result<Receipt, TransportError> {
        let receipt: String = self
            .client
            .request(RECEIPT_METHOD, rpc_params![to_hex(transaction_id)])
            .await
            .context(RpcSnafu {
                method: RECEIPT_METHOD,
            })?;
        from_hex(RECEIPT_METHOD, &receipt)
    }

    async fn get_record(
        &self,
        transaction_id: &TransactionId,
        payment: &SignedTransaction,
    ) -> Result<RecordAnswer, TransportError> {
        let answer: String = self
            .client
            .request(
                RECORD_METHOD,
                rpc_params![to_hex(transaction_id), to_hex(payment)],
            )
            .await
            .context(RpcSnafu {
                method: RECORD_METHOD,
            })?;
        from_hex(RECORD_METHOD, &answer)
    }
}

/// Hex encodes the SCALE encoding of `value` with a `0x` prefix.
pub fn to_hex<T: Encode>(value: &T) -> String {
    format!("0x{}", hex::encode(value.encode()))
}

/// Decodes a `0x`-prefixed hex string of SCALE bytes.
pub fn from_hex<T: Decode>(method: &'static str, payload: &str) -> Result<T, TransportError> {
    let bytes =
        hex::decode(payload.trim_start_matches("0x")).context(HexDecodeSnafu { method })?;
    T::decode(&mut bytes.as_slice()).context(DecodeSnafu { method })
}
