//! # Configuration Context
//!
//! Every call is parameterized by a chain of override frames. A frame holds a
//! sparse map of explicitly set values and a pointer to its parent. Reading a
//! setting walks from the current frame towards the root and returns the
//! first explicit value, or the setting's root default when no frame sets it.
//!
//! "Unset" is the absence of an entry, which is distinct from any value,
//! including `None`, zero or an empty string: setting `Signatory` to `None` in
//! a child hides the parent's signatory, resetting it makes the parent's
//! visible again.
//!
//! Frames also own the gateway channels they create. A channel is created by
//! the frame that configured the gateway it talks to, so disposing a per-call
//! frame only drops connections that frame introduced.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use ledger_core::{AccountId, SignedTransaction, Signatory};
use log::debug;
use tokio::sync::OnceCell;

use crate::channel::{Connector, NodeChannel, WsConnector};
use crate::error::TransportError;

/// The gateway node a request is submitted to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gateway {
    /// The node's account, credited with node fees.
    pub node: AccountId,
    /// The node's endpoint URL.
    pub url: String,
}

impl Gateway {
    /// Creates a gateway description.
    pub fn new(node: AccountId, url: impl Into<String>) -> Self {
        Self {
            node,
            url: url.into(),
        }
    }
}

/// Hook invoked with every signed envelope just before it is sent.
#[derive(Clone)]
pub struct RequestHook(Arc<dyn Fn(&SignedTransaction) + Send + Sync>);

impl RequestHook {
    /// Wraps a function as a request hook.
    pub fn new(hook: impl Fn(&SignedTransaction) + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    /// Runs the hook.
    pub fn call(&self, transaction: &SignedTransaction) {
        (self.0)(transaction)
    }
}

impl fmt::Debug for RequestHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestHook")
    }
}

/// Declares the settings, their root defaults and typed accessors.
macro_rules! settings {
    ($(
        $(#[$doc:meta])*
        $variant:ident: $ty:ty = $default:expr, $getter:ident, $setter:ident;
    )*) => {
        /// Identifies a setting independently of its value.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum SettingKey {
            $(
                $(#[$doc])*
                $variant,
            )*
        }

        /// A setting together with its value.
        #[derive(Clone, Debug)]
        pub enum Setting {
            $(
                $(#[$doc])*
                $variant($ty),
            )*
        }

        impl Setting {
            /// The key this value is stored under.
            pub fn key(&self) -> SettingKey {
                match self {
                    $(Setting::$variant(_) => SettingKey::$variant,)*
                }
            }

            /// The value used when no frame sets `key`.
            pub fn root_default(key: SettingKey) -> Setting {
                match key {
                    $(SettingKey::$variant => Setting::$variant($default),)*
                }
            }
        }

        impl ConfigContext {
            $(
                $(#[$doc])*
                pub fn $getter(&self) -> $ty {
                    self.lookup(SettingKey::$variant, |setting| match setting {
                        Setting::$variant(value) => Some(value),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    })
                    .unwrap_or_else(|| $default)
                }

                #[doc = concat!("Sets `", stringify!($variant), "` on this frame only.")]
                pub fn $setter(&self, value: $ty) {
                    self.set(Setting::$variant(value));
                }
            )*
        }
    };
}

settings! {
    /// The gateway node requests are submitted to.
    Gateway: Option<Gateway> = None, gateway, set_gateway;
    /// The account paying for transactions.
    Payer: Option<AccountId> = None, payer, set_payer;
    /// The default signatory, signing every transaction and every query payment.
    Signatory: Option<Signatory> = None, signatory, set_signatory;
    /// Maximum transaction fee, in the smallest denomination.
    FeeLimit: u64 = 100_000_000, fee_limit, set_fee_limit;
    /// Amount paid to the gateway for a detailed record query.
    QueryFee: u64 = 100_000, query_fee, set_query_fee;
    /// Length of each transaction's validity window.
    TransactionDuration: Duration = Duration::from_secs(120), transaction_duration, set_transaction_duration;
    /// How many times a transient failure is retried.
    RetryCount: u32 = 5, retry_count, set_retry_count;
    /// Pause between retries, also the receipt polling interval.
    RetryDelay: Duration = Duration::from_millis(200), retry_delay, set_retry_delay;
    /// Maximum length of signature map key prefixes, zero for untrimmed.
    SignaturePrefixTrimLimit: usize = 0, signature_prefix_trim_limit, set_signature_prefix_trim_limit;
    /// Move valid start times back when the gateway reports them in the future.
    AdjustForLocalClockDrift: bool = false, adjust_for_local_clock_drift, set_adjust_for_local_clock_drift;
    /// Memo attached to transactions.
    Memo: String = String::new(), memo, set_memo;
    /// Fetch the detailed record after a successful transaction.
    FetchRecord: bool = false, fetch_record, set_fetch_record;
    /// Hook invoked with each signed envelope before it is sent.
    OnRequestCreated: Option<RequestHook> = None, on_request_created, set_on_request_created;
}

/// One cached channel; initialized at most once even under concurrent first use.
type ChannelCell = Arc<OnceCell<Arc<dyn NodeChannel>>>;

/// A single override frame.
struct Frame {
    /// Explicitly set values of this frame.
    values: RwLock<HashMap<SettingKey, Setting>>,
    /// Channels created by this frame, keyed by endpoint URL.
    channels: Mutex<HashMap<String, ChannelCell>>,
    /// The frame this one inherits from.
    parent: Option<Arc<Frame>>,
}

impl Frame {
    fn new(parent: Option<Arc<Frame>>) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            parent,
        }
    }

    /// Iterates this frame and its ancestors, nearest first.
    fn chain(self: &Arc<Self>) -> impl Iterator<Item = &Arc<Frame>> {
        std::iter::successors(Some(self), |frame| frame.parent.as_ref())
    }

    fn explicit(&self, key: SettingKey) -> Option<Setting> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn cached_channel(&self, url: &str) -> Option<Arc<dyn NodeChannel>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .and_then(|cell| cell.get().cloned())
    }

    fn channel_cell(&self, url: &str) -> ChannelCell {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .clone()
    }
}

/// A handle to one frame of the configuration chain.
///
/// Cloning the handle shares the frame; use [`ConfigContext::child`] to
/// start a new frame.
#[derive(Clone)]
pub struct ConfigContext {
    frame: Arc<Frame>,
    connector: Arc<dyn Connector>,
}

impl ConfigContext {
    /// Creates a root context connecting to gateways over WebSockets.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(WsConnector::default()))
    }

    /// Creates a root context that opens channels through `connector`.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            frame: Arc::new(Frame::new(None)),
            connector,
        }
    }

    /// Creates a frame inheriting from this one.
    ///
    /// The child sees the current and future values of every setting it does
    /// not set itself; its own writes are invisible to this frame.
    pub fn child(&self) -> Self {
        Self {
            frame: Arc::new(Frame::new(Some(self.frame.clone()))),
            connector: self.connector.clone(),
        }
    }

    /// Creates a child frame and applies `overrides` to it.
    pub fn clone_with(&self, overrides: impl FnOnce(&ConfigContext)) -> Self {
        let child = self.child();
        overrides(&child);
        child
    }

    /// The effective value of `key`.
    pub fn get(&self, key: SettingKey) -> Setting {
        self.frame
            .chain()
            .find_map(|frame| frame.explicit(key))
            .unwrap_or_else(|| Setting::root_default(key))
    }

    /// Sets a value on this frame only.
    pub fn set(&self, setting: Setting) {
        self.frame
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(setting.key(), setting);
    }

    /// Clears this frame's value for `key` so the parent's value shows through.
    pub fn reset(&self, key: SettingKey) {
        self.frame
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    /// Whether this frame itself sets `key`.
    pub fn is_set_here(&self, key: SettingKey) -> bool {
        self.frame.explicit(key).is_some()
    }

    fn lookup<T>(&self, key: SettingKey, extract: impl Fn(Setting) -> Option<T>) -> Option<T> {
        self.frame
            .chain()
            .find_map(|frame| frame.explicit(key))
            .and_then(extract)
    }

    /// Returns a channel to `url`, opening and caching one if needed.
    ///
    /// Channels cached by this frame or any ancestor are reused. Otherwise the
    /// frame that configured the gateway setting creates and owns the channel;
    /// concurrent first requests for the same address share one connection attempt.
    pub async fn channel(&self, url: &str) -> Result<Arc<dyn NodeChannel>, TransportError> {
        if let Some(channel) = self
            .frame
            .chain()
            .find_map(|frame| frame.cached_channel(url))
        {
            return Ok(channel);
        }

        let owner = self
            .frame
            .chain()
            .find(|frame| frame.explicit(SettingKey::Gateway).is_some())
            .unwrap_or(&self.frame);

        let cell = owner.channel_cell(url);
        let channel = cell
            .get_or_try_init(|| async {
                debug!("opening channel to {url}");
                self.connector.connect(url).await
            })
            .await?;
        Ok(channel.clone())
    }

    /// Releases the channels this frame created.
    ///
    /// Channels created by ancestors are untouched; requests still holding a
    /// released channel keep it alive until they finish.
    pub fn dispose(&self) {
        let released = std::mem::take(
            &mut *self
                .frame
                .channels
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !released.is_empty() {
            debug!("released {} channel(s)", released.len());
        }
    }
}

impl Default for ConfigContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use ledger_core::{Receipt, RecordAnswer, ResponseCode, TransactionId};

    use super::*;

    struct NullChannel;

    #[async_trait]
    impl NodeChannel for NullChannel {
        async fn submit_transaction(
            &self,
            _: &SignedTransaction,
        ) -> Result<ResponseCode, TransportError> {
            Ok(ResponseCode::OK)
        }

        async fn get_receipt(&self, transaction_id: &TransactionId) -> Result<Receipt, TransportError> {
            Ok(Receipt {
                transaction_id: *transaction_id,
                status: ResponseCode::SUCCESS,
            })
        }

        async fn get_record(
            &self,
            _: &TransactionId,
            _: &SignedTransaction,
        ) -> Result<RecordAnswer, TransportError> {
            Ok(RecordAnswer {
                precheck: ResponseCode::OK,
                record: None,
            })
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, _: &str) -> Result<Arc<dyn NodeChannel>, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Arc::new(NullChannel))
        }
    }

    fn gateway(url: &str) -> Option<Gateway> {
        Some(Gateway::new(AccountId::new(0, 0, 3), url))
    }

    #[test]
    fn unset_settings_fall_back_to_root_defaults() {
        let root = ConfigContext::new();

        assert_eq!(root.fee_limit(), 100_000_000);
        assert_eq!(root.retry_count(), 5);
        assert_eq!(root.signature_prefix_trim_limit(), 0);
        assert_eq!(root.gateway(), None);
        assert!(matches!(
            root.get(SettingKey::TransactionDuration),
            Setting::TransactionDuration(duration) if duration == Duration::from_secs(120)
        ));
    }

    #[test]
    fn a_child_reads_the_nearest_ancestor_value() {
        let root = ConfigContext::new();
        root.set_fee_limit(10);
        let middle = root.child();
        middle.set_fee_limit(20);
        let leaf = middle.child();

        assert_eq!(leaf.fee_limit(), 20);
        middle.reset(SettingKey::FeeLimit);
        assert_eq!(leaf.fee_limit(), 10);
    }

    #[test]
    fn a_child_observes_later_parent_writes_but_keeps_its_own_private() {
        let root = ConfigContext::new();
        let child = root.child();

        root.set_memo("from root".into());
        assert_eq!(child.memo(), "from root");

        child.set_memo("from child".into());
        assert_eq!(child.memo(), "from child");
        assert_eq!(root.memo(), "from root");
    }

    #[test]
    fn reset_falls_through_even_after_repeated_set_and_reset() {
        let root = ConfigContext::new();
        root.set_retry_count(7);
        let child = root.child();

        for value in [1, 2, 3] {
            child.set_retry_count(value);
            assert_eq!(child.retry_count(), value);
            child.reset(SettingKey::RetryCount);
            assert_eq!(child.retry_count(), 7);
        }
        child.reset(SettingKey::RetryCount);
        assert_eq!(child.retry_count(), 7);
        assert!(!child.is_set_here(SettingKey::RetryCount));
    }

    #[test]
    fn setting_none_is_distinct_from_unset() {
        let root = ConfigContext::new();
        root.set_payer(Some(AccountId::new(0, 0, 2)));
        let child = root.child();

        child.set_payer(None);
        assert_eq!(child.payer(), None);

        child.reset(SettingKey::Payer);
        assert_eq!(child.payer(), Some(AccountId::new(0, 0, 2)));
    }

    #[test]
    fn clone_with_applies_overrides_to_the_new_frame_only() {
        let root = ConfigContext::new();
        let child = root.clone_with(|ctx| ctx.set_signature_prefix_trim_limit(4));

        assert_eq!(child.signature_prefix_trim_limit(), 4);
        assert_eq!(root.signature_prefix_trim_limit(), 0);
        assert!(child.is_set_here(SettingKey::SignaturePrefixTrimLimit));
    }

    #[tokio::test]
    async fn concurrent_first_use_opens_one_channel_per_address() {
        let connector = Arc::new(CountingConnector::default());
        let root = ConfigContext::with_connector(connector.clone());
        root.set_gateway(gateway("ws://node-a"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = root.clone();
                tokio::spawn(async move { ctx.channel("ws://node-a").await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        root.channel("ws://node-b").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn children_reuse_ancestor_channels_and_disposal_keeps_them() {
        let connector = Arc::new(CountingConnector::default());
        let root = ConfigContext::with_connector(connector.clone());
        root.set_gateway(gateway("ws://node-a"));
        root.channel("ws://node-a").await.unwrap();

        let child = root.child();
        child.channel("ws://node-a").await.unwrap();
        child.dispose();
        root.channel("ws://node-a").await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_child_owns_channels_for_the_gateway_it_configures() {
        let connector = Arc::new(CountingConnector::default());
        let root = ConfigContext::with_connector(connector.clone());
        root.set_gateway(gateway("ws://node-a"));

        let child = root.clone_with(|ctx| ctx.set_gateway(gateway("ws://node-b")));
        child.channel("ws://node-b").await.unwrap();
        child.channel("ws://node-b").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        child.dispose();
        child.channel("ws://node-b").await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }
}
