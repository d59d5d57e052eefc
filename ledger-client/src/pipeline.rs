//! Transaction submission: signing, bounded-retry submission, consensus polling
//! and the optional billed record fetch.
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use codec::Encode;
use ledger_core::{
    AccountId,
    Invoice,
    Receipt,
    Record,
    RecordAnswer,
    ResponseCode,
    SignedTransaction,
    Signatory,
    Timestamp,
    TransactionBody,
    TransactionData,
    TransactionId,
    TransferList,
};
use log::{debug, error, info, warn};
use snafu::ResultExt;
use tokio::time::{sleep, sleep_until, Duration, Instant};

use crate::channel::NodeChannel;
use crate::context::{ConfigContext, Gateway, RequestHook};
use crate::error::{Error, Result, SigningSnafu, TransportError, TransportSnafu};

/// How far each `INVALID_TRANSACTION_START` moves later valid start times back
/// when clock drift adjustment is enabled.
pub const CLOCK_DRIFT_STEP: Duration = Duration::from_secs(5);

/// Last valid start handed out by this process, in nanoseconds since the epoch.
static LAST_VALID_START: AtomicI64 = AtomicI64::new(0);

/// Where a submission currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Assembling the transaction body.
    Building,
    /// Collecting signatures.
    Signing,
    /// Waiting for the gateway's precheck answer.
    Submitting {
        /// One-based attempt number.
        attempt: u32,
    },
    /// Accepted by the gateway, polling for a receipt.
    AwaitingConsensus,
    /// Paying for and fetching the detailed record.
    FetchingRecord,
    /// Finished successfully.
    Succeeded,
    /// Rejected by the gateway before consensus.
    PrecheckRejected,
    /// Reached consensus with a non-success status.
    TransactionFailed,
    /// No terminal receipt before the validity window closed.
    ConsensusTimedOut,
    /// The gateway could not be reached.
    TransportFailed,
    /// Stopped by an invalid request, a configuration, key or signing failure.
    Aborted,
}

/// The result of a successful submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// The terminal receipt.
    pub receipt: Receipt,
    /// The detailed record, when `FetchRecord` was enabled.
    pub record: Option<Record>,
}

impl TransactionOutcome {
    /// Id of the accepted attempt.
    pub fn transaction_id(&self) -> &TransactionId {
        &self.receipt.transaction_id
    }
}

/// Effective settings, resolved once per submission.
#[derive(Clone, Debug)]
struct Settings {
    gateway: Gateway,
    payer: AccountId,
    default_signatory: Option<Signatory>,
    fee_limit: u64,
    query_fee: u64,
    transaction_duration: Duration,
    retry_count: u32,
    retry_delay: Duration,
    trim_limit: usize,
    adjust_for_clock_drift: bool,
    memo: String,
    fetch_record: bool,
    on_request_created: Option<RequestHook>,
}

impl Settings {
    fn resolve(ctx: &ConfigContext) -> Result<Self> {
        let gateway = ctx.gateway().ok_or(Error::Configuration { setting: "gateway" })?;
        let payer = ctx.payer().ok_or(Error::Configuration { setting: "payer" })?;
        let default_signatory = ctx.signatory();
        let fetch_record = ctx.fetch_record();
        if fetch_record && default_signatory.is_none() {
            return Err(Error::Configuration {
                setting: "signatory",
            });
        }

        Ok(Self {
            gateway,
            payer,
            default_signatory,
            fee_limit: ctx.fee_limit(),
            query_fee: ctx.query_fee(),
            transaction_duration: ctx.transaction_duration(),
            retry_count: ctx.retry_count(),
            retry_delay: ctx.retry_delay(),
            trim_limit: ctx.signature_prefix_trim_limit(),
            adjust_for_clock_drift: ctx.adjust_for_local_clock_drift(),
            memo: ctx.memo(),
            fetch_record,
            on_request_created: ctx.on_request_created(),
        })
    }
}

/// What to do after one precheck or transport outcome.
enum Next {
    Retry,
    Fail(Error),
}

/// Drives one transaction from body construction to a terminal outcome.
///
/// All settings are read from the context when the pipeline is created;
/// later changes to the context do not affect a running submission.
pub struct SubmissionPipeline {
    ctx: ConfigContext,
    settings: Settings,
    signatory: Signatory,
    state: PipelineState,
    drift: Duration,
}

impl SubmissionPipeline {
    /// Resolves settings and the signatory for one submission.
    ///
    /// The context's default signatory signs first, followed by
    /// `call_signatory`. Fails without any network traffic when the gateway,
    /// the payer or every signatory is missing.
    pub fn new(ctx: &ConfigContext, call_signatory: Option<Signatory>) -> Result<Self> {
        let settings = Settings::resolve(ctx)?;
        let children: Vec<Signatory> = settings
            .default_signatory
            .clone()
            .into_iter()
            .chain(call_signatory)
            .collect();
        let signatory = Signatory::list(children).map_err(|_| Error::Configuration {
            setting: "signatory",
        })?;

        Ok(Self {
            ctx: ctx.clone(),
            settings,
            signatory,
            state: PipelineState::Building,
            drift: Duration::ZERO,
        })
    }

    /// The current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Submits `data` and waits for its outcome.
    ///
    /// Dropping the returned future abandons the submission at its next
    /// network call; a transaction the gateway already accepted may still
    /// reach consensus.
    pub async fn execute(&mut self, data: TransactionData) -> Result<TransactionOutcome> {
        let result = self.run(data).await;
        match &result {
            Ok(_) => self.transition(PipelineState::Succeeded),
            Err(Error::Precheck { .. }) => self.transition(PipelineState::PrecheckRejected),
            Err(Error::TransactionFailed { .. }) => {
                self.transition(PipelineState::TransactionFailed)
            }
            Err(Error::ConsensusTimeout { .. }) => {
                self.transition(PipelineState::ConsensusTimedOut)
            }
            Err(Error::Transport { .. }) => self.transition(PipelineState::TransportFailed),
            Err(
                Error::Configuration { .. }
                | Error::InvalidAmount { .. }
                | Error::KeyFileRead { .. }
                | Error::KeyParse { .. }
                | Error::Key { .. }
                | Error::Signing { .. },
            ) => self.transition(PipelineState::Aborted),
        }
        result
    }

    async fn run(&mut self, data: TransactionData) -> Result<TransactionOutcome> {
        let channel = self
            .ctx
            .channel(&self.settings.gateway.url)
            .await
            .context(TransportSnafu)?;

        let transaction_id = self.submit(channel.as_ref(), &data).await?;
        let receipt = self.await_consensus(channel.as_ref(), transaction_id).await?;
        if !receipt.status.is_success() {
            error!("❌ Transaction {} failed: {}", transaction_id, receipt.status);
            return Err(Error::TransactionFailed { receipt });
        }
        info!("✅ Transaction {} succeeded", transaction_id);

        let record = if self.settings.fetch_record {
            Some(self.fetch_record(channel.as_ref(), transaction_id).await?)
        } else {
            None
        };
        Ok(TransactionOutcome { receipt, record })
    }

    /// Signs and sends the transaction until the gateway accepts it.
    async fn submit(
        &mut self,
        channel: &dyn NodeChannel,
        data: &TransactionData,
    ) -> Result<TransactionId> {
        let signatory = self.signatory.clone();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.transition(PipelineState::Building);
            let body = self.build_body(data.clone());
            let transaction_id = body.transaction_id;

            self.transition(PipelineState::Signing);
            let signed = self.sign(&body, &signatory).await?;

            self.transition(PipelineState::Submitting { attempt });
            self.notify(&signed);
            let next = match channel.submit_transaction(&signed).await {
                Ok(ResponseCode::OK) => {
                    info!(
                        "✅ Transaction {} accepted on attempt {}",
                        transaction_id, attempt
                    );
                    return Ok(transaction_id);
                }
                Ok(status) => {
                    let transient = self.is_transient(status);
                    self.on_precheck(transaction_id, status, transient, attempt)
                }
                Err(source) => self.on_transport_error(source, attempt),
            };
            match next {
                Next::Retry => sleep(self.settings.retry_delay).await,
                Next::Fail(err) => return Err(err),
            }
        }
    }

    /// Polls for a receipt until it is terminal or the validity window closes.
    ///
    /// More than `RetryCount` consecutive failed polls end polling with the
    /// last transport error.
    async fn await_consensus(
        &mut self,
        channel: &dyn NodeChannel,
        transaction_id: TransactionId,
    ) -> Result<Receipt> {
        self.transition(PipelineState::AwaitingConsensus);
        let deadline = self.validity_deadline(&transaction_id);
        let mut last_status = ResponseCode::UNKNOWN;
        let mut polls = 0u32;
        let mut failed_polls = 0u32;

        loop {
            polls += 1;
            match channel.get_receipt(&transaction_id).await {
                Ok(receipt) if is_pending(receipt.status) => {
                    debug!(
                        "Receipt for {} still pending after {} poll(s): {}",
                        transaction_id, polls, receipt.status
                    );
                    last_status = receipt.status;
                    failed_polls = 0;
                }
                Ok(receipt) => return Ok(receipt),
                Err(source) => {
                    failed_polls += 1;
                    if failed_polls > self.settings.retry_count {
                        error!(
                            "❌ Receipt for {} unreachable after {} failed polls: {}",
                            transaction_id, failed_polls, source
                        );
                        return Err(Error::Transport { source });
                    }
                    warn!("⚠️ Receipt poll {} failed: {}. Retrying...", polls, source);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                error!(
                    "❌ Transaction {} still pending when its validity window closed",
                    transaction_id
                );
                return Err(Error::ConsensusTimeout {
                    transaction_id,
                    last_status,
                });
            }
            sleep_until((now + self.settings.retry_delay).min(deadline)).await;
        }
    }

    /// Pays for and fetches the detailed record of an executed transaction.
    ///
    /// The payment is signed by the context's default signatory alone.
    async fn fetch_record(
        &mut self,
        channel: &dyn NodeChannel,
        transaction_id: TransactionId,
    ) -> Result<Record> {
        self.transition(PipelineState::FetchingRecord);
        let payer = self.settings.default_signatory.clone().ok_or(Error::Configuration {
            setting: "signatory",
        })?;
        let fee = i64::try_from(self.settings.query_fee).unwrap_or(i64::MAX);
        let payment_data = TransactionData::QueryPayment(
            TransferList::between(self.settings.payer, self.settings.gateway.node, fee)
                .ok_or(Error::InvalidAmount { amount: fee })?,
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let body = self.build_body(payment_data.clone());
            let payment_id = body.transaction_id;
            let payment = self.sign(&body, &payer).await?;
            self.notify(&payment);

            let next = match channel.get_record(&transaction_id, &payment).await {
                Ok(RecordAnswer {
                    precheck: ResponseCode::OK,
                    record: Some(record),
                }) => {
                    info!("📄 Fetched record for {}", transaction_id);
                    return Ok(record);
                }
                Ok(RecordAnswer {
                    precheck: ResponseCode::OK,
                    record: None,
                }) => self.on_precheck(payment_id, ResponseCode::RECORD_NOT_FOUND, true, attempt),
                Ok(RecordAnswer { precheck, .. }) => {
                    let transient = self.is_transient(precheck);
                    self.on_precheck(payment_id, precheck, transient, attempt)
                }
                Err(source) => self.on_transport_error(source, attempt),
            };
            match next {
                Next::Retry => sleep(self.settings.retry_delay).await,
                Next::Fail(err) => return Err(err),
            }
        }
    }

    fn on_precheck(
        &mut self,
        transaction_id: TransactionId,
        status: ResponseCode,
        transient: bool,
        attempt: u32,
    ) -> Next {
        if !transient {
            error!("❌ Transaction {} rejected: {}", transaction_id, status);
            return Next::Fail(Error::Precheck {
                transaction_id,
                status,
            });
        }
        if attempt > self.settings.retry_count {
            error!(
                "❌ Transaction {} still {} after {} attempts",
                transaction_id, status, attempt
            );
            return Next::Fail(Error::Precheck {
                transaction_id,
                status,
            });
        }
        if status == ResponseCode::INVALID_TRANSACTION_START {
            self.drift += CLOCK_DRIFT_STEP;
            debug!("Valid start moved back by {:?}", self.drift);
        }
        warn!(
            "⚠️ Attempt {} for {} returned {}. Retrying...",
            attempt, transaction_id, status
        );
        Next::Retry
    }

    fn on_transport_error(&self, source: TransportError, attempt: u32) -> Next {
        if attempt > self.settings.retry_count {
            error!(
                "❌ Gateway unreachable after {} attempts: {}",
                attempt, source
            );
            return Next::Fail(Error::Transport { source });
        }
        warn!("⚠️ Attempt {} failed: {}. Retrying...", attempt, source);
        Next::Retry
    }

    fn is_transient(&self, status: ResponseCode) -> bool {
        matches!(
            status,
            ResponseCode::BUSY
                | ResponseCode::PLATFORM_NOT_ACTIVE
                | ResponseCode::PLATFORM_TRANSACTION_NOT_CREATED
        ) || (self.settings.adjust_for_clock_drift
            && status == ResponseCode::INVALID_TRANSACTION_START)
    }

    fn build_body(&self, data: TransactionData) -> TransactionBody {
        TransactionBody {
            transaction_id: TransactionId {
                payer: self.settings.payer,
                valid_start: next_valid_start(self.drift),
            },
            node: self.settings.gateway.node,
            fee_limit: self.settings.fee_limit,
            valid_duration_seconds: self.settings.transaction_duration.as_secs(),
            memo: self.settings.memo.clone(),
            data,
        }
    }

    async fn sign(
        &self,
        body: &TransactionBody,
        signatory: &Signatory,
    ) -> Result<SignedTransaction> {
        let body_bytes = body.encode();
        let mut invoice = Invoice::new(
            body.transaction_id,
            body.memo.clone(),
            body_bytes.clone(),
            self.settings.trim_limit,
        );
        signatory.sign(&mut invoice).await.context(SigningSnafu)?;
        let sig_map = invoice.generate().context(SigningSnafu)?;
        Ok(SignedTransaction {
            body_bytes,
            sig_map,
        })
    }

    fn notify(&self, transaction: &SignedTransaction) {
        if let Some(hook) = &self.settings.on_request_created {
            hook.call(transaction);
        }
    }

    /// The instant the transaction's validity window closes.
    fn validity_deadline(&self, transaction_id: &TransactionId) -> Instant {
        let closes = transaction_id.valid_start.to_system_time() + self.settings.transaction_duration;
        let remaining = closes
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        Instant::now() + remaining
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state != next {
            debug!("{:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Statuses meaning consensus has not been reached yet.
fn is_pending(status: ResponseCode) -> bool {
    matches!(
        status,
        ResponseCode::UNKNOWN | ResponseCode::RECEIPT_NOT_FOUND | ResponseCode::BUSY | ResponseCode::OK
    )
}

/// A valid start no earlier than now minus `drift`, unique within this process.
fn next_valid_start(drift: Duration) -> Timestamp {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default();
    let previous = LAST_VALID_START
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    let unique = now.max(previous + 1);
    let drift = i64::try_from(drift.as_nanos()).unwrap_or(i64::MAX);
    Timestamp::from_nanos(unique.saturating_sub(drift))
}

/// Submits `data` with the settings of `ctx`.
///
/// Convenience wrapper around [`SubmissionPipeline`].
pub async fn submit(
    ctx: &ConfigContext,
    data: TransactionData,
    signatory: Option<Signatory>,
) -> Result<TransactionOutcome> {
    SubmissionPipeline::new(ctx, signatory)?.execute(data).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ConfigContext {
        let ctx = ConfigContext::new();
        ctx.set_gateway(Some(Gateway::new(AccountId::new(0, 0, 3), "ws://unused")));
        ctx.set_payer(Some(AccountId::new(0, 0, 1001)));
        ctx
    }

    #[test]
    fn valid_starts_are_strictly_increasing() {
        let mut last = next_valid_start(Duration::ZERO);
        for _ in 0..1000 {
            let next = next_valid_start(Duration::ZERO);
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn drift_moves_the_valid_start_back() {
        let now = next_valid_start(Duration::ZERO).as_nanos();
        let adjusted = next_valid_start(CLOCK_DRIFT_STEP).as_nanos();
        assert!(adjusted < now);
        assert!(now - adjusted <= CLOCK_DRIFT_STEP.as_nanos() as i64);
    }

    #[test]
    fn we_cannot_build_a_pipeline_without_a_payer() {
        let ctx = context();
        ctx.set_payer(None);
        let err = SubmissionPipeline::new(&ctx, Some(Signatory::from_private_key(&[1; 32]).unwrap()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration { setting: "payer" }));
    }

    #[test]
    fn we_cannot_build_a_pipeline_without_any_signatory() {
        let err = SubmissionPipeline::new(&context(), None).err().unwrap();
        assert!(matches!(err, Error::Configuration { setting: "signatory" }));
    }

    #[test]
    fn we_cannot_fetch_records_without_a_default_signatory() {
        let ctx = context();
        ctx.set_fetch_record(true);
        let err = SubmissionPipeline::new(&ctx, Some(Signatory::from_private_key(&[1; 32]).unwrap()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration { setting: "signatory" }));
    }

    #[test]
    fn context_signatory_signs_before_the_call_signatory() {
        let ctx = context();
        let default = Signatory::from_private_key(&[1; 32]).unwrap();
        let call = Signatory::from_private_key(&[2; 32]).unwrap();
        ctx.set_signatory(Some(default.clone()));

        let pipeline = SubmissionPipeline::new(&ctx, Some(call.clone())).unwrap();

        assert_eq!(pipeline.signatory, Signatory::list(vec![default, call]).unwrap());
        assert_eq!(pipeline.state(), PipelineState::Building);
    }

    #[test]
    fn clock_drift_codes_are_transient_only_when_enabled() {
        let ctx = context();
        ctx.set_signatory(Some(Signatory::from_private_key(&[1; 32]).unwrap()));
        let pipeline = SubmissionPipeline::new(&ctx, None).unwrap();
        assert!(!pipeline.is_transient(ResponseCode::INVALID_TRANSACTION_START));
        assert!(pipeline.is_transient(ResponseCode::BUSY));

        ctx.set_adjust_for_local_clock_drift(true);
        let pipeline = SubmissionPipeline::new(&ctx, None).unwrap();
        assert!(pipeline.is_transient(ResponseCode::INVALID_TRANSACTION_START));
        assert!(!pipeline.is_transient(ResponseCode::INVALID_SIGNATURE));
    }

    #[test]
    fn pending_statuses_keep_polling() {
        assert!(is_pending(ResponseCode::OK));
        assert!(is_pending(ResponseCode::RECEIPT_NOT_FOUND));
        assert!(!is_pending(ResponseCode::SUCCESS));
        assert!(!is_pending(ResponseCode::INSUFFICIENT_PAYER_BALANCE));
    }
}
