use std::sync::Arc;

use ledger_core::{AccountId, Signatory, TransactionData, TransferList};

use crate::channel::Connector;
use crate::context::ConfigContext;
use crate::error::{Error, Result};
use crate::pipeline::{SubmissionPipeline, TransactionOutcome};

/// Entry point for submitting transactions.
///
/// A client is a handle to one configuration frame. Clones share the frame;
/// [`Client::clone_with`] derives a client with its own overrides.
#[derive(Clone, Default)]
pub struct Client {
    ctx: ConfigContext,
}

impl Client {
    /// Creates a client with an empty root configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client opening gateway channels through `connector`.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            ctx: ConfigContext::with_connector(connector),
        }
    }

    /// The client's configuration frame.
    pub fn context(&self) -> &ConfigContext {
        &self.ctx
    }

    /// Derives a client whose frame inherits from this one.
    pub fn clone_with(&self, overrides: impl FnOnce(&ConfigContext)) -> Self {
        Self {
            ctx: self.ctx.clone_with(overrides),
        }
    }

    /// Submits `data`, signed by the configured signatory and `signatory`.
    pub async fn execute(
        &self,
        data: TransactionData,
        signatory: Option<Signatory>,
    ) -> Result<TransactionOutcome> {
        SubmissionPipeline::new(&self.ctx, signatory)?
            .execute(data)
            .await
    }

    /// Submits `data` with overrides that apply to this call only.
    ///
    /// Channels opened for a gateway configured by the overrides are released
    /// when the call finishes.
    pub async fn execute_with(
        &self,
        overrides: impl FnOnce(&ConfigContext),
        data: TransactionData,
        signatory: Option<Signatory>,
    ) -> Result<TransactionOutcome> {
        let call = self.ctx.clone_with(overrides);
        let result = match SubmissionPipeline::new(&call, signatory) {
            Ok(mut pipeline) => pipeline.execute(data).await,
            Err(err) => Err(err),
        };
        call.dispose();
        result
    }

    /// Transfers `amount` from the payer to `recipient`.
    pub async fn transfer(
        &self,
        recipient: AccountId,
        amount: i64,
        signatory: Option<Signatory>,
    ) -> Result<TransactionOutcome> {
        let payer = self
            .ctx
            .payer()
            .ok_or(Error::Configuration { setting: "payer" })?;
        let transfers = TransferList::between(payer, recipient, amount)
            .ok_or(Error::InvalidAmount { amount })?;
        let data = TransactionData::CryptoTransfer(transfers);
        self.execute(data, signatory).await
    }

    /// Releases the channels this client's frame opened.
    pub fn dispose(&self) {
        self.ctx.dispose();
    }
}
