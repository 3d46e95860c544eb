// ── Account lifecycle ──
//
// One configured Miele account: its client, retry counters, device
// store and background tasks, owned by a single cloneable handle
// instead of ambient global state. Setup performs the first fetch,
// loads action capabilities, and spawns the event listener and the
// periodic poller; unload cancels and joins them.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use miele_api::client::{read_json, with_timeout};
use miele_api::header::{ACCEPT, HeaderValue};
use miele_api::{
    EventHandler, EventListener, HandlerError, ListenerState, Method, MieleClient, RequestOptions,
    StatusCode, TokenProvider,
};
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::appliance::{Classification, classify};
use crate::config::AccountConfig;
use crate::error::CoreError;
use crate::fetcher::{FetchOutcome, Fetcher, RetryCounters};
use crate::flatten::{FlatDevice, flatten_devices};
use crate::services::{self, GenericAction, ProcessAction};
use crate::store::DeviceStore;

// ── AccountState ─────────────────────────────────────────────────────

/// Health of an account, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Initializing,
    /// Last fetch succeeded.
    Ready,
    /// Last fetch failed; the next poll may recover.
    Degraded,
    /// The cloud keeps rejecting the token. Needs a new one; held until
    /// the next successful fetch.
    ReauthRequired,
    /// Terminal.
    Unloaded,
}

// ── Account ──────────────────────────────────────────────────────────

/// Handle to one account. Cheap to clone.
pub struct Account<A> {
    inner: Arc<AccountInner<A>>,
}

impl<A> Clone for Account<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AccountInner<A> {
    config: AccountConfig,
    client: MieleClient<A>,
    store: Arc<DeviceStore>,
    fetcher: Mutex<Fetcher<A>>,
    state: watch::Sender<AccountState>,
    listener_state: OnceLock<watch::Receiver<ListenerState>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: TokenProvider> Account<A> {
    /// Build the account and its HTTP client. Does not touch the network;
    /// call [`setup()`](Self::setup) to start.
    pub fn new(config: AccountConfig, auth: A) -> Result<Self, CoreError> {
        let client = MieleClient::new(config.api_url.as_str(), auth, &config.transport)?;
        Ok(Self::with_client(config, client))
    }

    /// Use an existing client (and its token provider).
    pub fn with_client(config: AccountConfig, client: MieleClient<A>) -> Self {
        let fetcher = Fetcher::new(client.clone(), config.language.clone(), config.fetch.clone());
        let (state, _) = watch::channel(AccountState::Initializing);

        Self {
            inner: Arc::new(AccountInner {
                config,
                client,
                store: Arc::new(DeviceStore::new()),
                fetcher: Mutex::new(fetcher),
                state,
                listener_state: OnceLock::new(),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &AccountConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &MieleClient<A> {
        &self.inner.client
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    pub fn state(&self) -> watch::Receiver<AccountState> {
        self.inner.state.subscribe()
    }

    /// State of the event listener, once [`setup()`](Self::setup) has started it.
    pub fn listener_state(&self) -> Option<watch::Receiver<ListenerState>> {
        self.inner.listener_state.get().cloned()
    }

    pub async fn retry_counters(&self) -> RetryCounters {
        self.inner.fetcher.lock().await.counters()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Bring the account up.
    ///
    /// Runs the first fetch, logs unsupported appliances, loads the action
    /// capabilities of every device, then spawns the event listener and
    /// the poll task. Fails with [`CoreError::AuthenticationFailed`] when
    /// the token is rejected and [`CoreError::NotReady`] for anything that
    /// may go away on its own.
    pub async fn setup(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Unloaded);
        }
        self.set_state(AccountState::Initializing);

        match self.fetch_and_apply().await {
            FetchOutcome::Success(_) => {}
            FetchOutcome::Fatal(failure) if failure.requires_reauth() => {
                self.set_state(AccountState::ReauthRequired);
                return Err(CoreError::AuthenticationFailed {
                    message: failure.to_string(),
                });
            }
            FetchOutcome::Retryable(failure) | FetchOutcome::Fatal(failure) => {
                self.set_state(AccountState::Degraded);
                return Err(CoreError::NotReady {
                    reason: failure.to_string(),
                });
            }
        }

        let serials = self.inner.store.serials();
        if serials.is_empty() {
            warn!("no devices found in API for this account");
        } else {
            debug!(?serials, "devices in API account");
        }
        for (serial, device) in self.inner.store.devices_snapshot() {
            log_classification(&serial, &device);
        }

        for serial in &serials {
            self.load_actions(serial).await?;
        }

        self.spawn_tasks().await?;
        self.set_state(AccountState::Ready);
        info!(devices = serials.len(), "account ready");
        Ok(())
    }

    /// Run one fetch cycle, apply a success to the store and update the
    /// account state.
    pub async fn refresh(&self) -> FetchOutcome {
        let outcome = self.fetch_and_apply().await;
        match &outcome {
            FetchOutcome::Success(_) => self.set_state(AccountState::Ready),
            // Only a success clears a pending re-authentication.
            FetchOutcome::Retryable(failure) | FetchOutcome::Fatal(failure)
                if self.reauth_pending() =>
            {
                debug!(error = %failure, "device refresh failed, re-authentication still required");
            }
            FetchOutcome::Retryable(failure) => {
                warn!(error = %failure, "device refresh failed, will retry");
                self.set_state(AccountState::Degraded);
            }
            FetchOutcome::Fatal(failure) if failure.requires_reauth() => {
                error!(error = %failure, "re-authentication required");
                self.set_state(AccountState::ReauthRequired);
            }
            FetchOutcome::Fatal(failure) => {
                error!(error = %failure, "device refresh failed");
                self.set_state(AccountState::Degraded);
            }
        }
        outcome
    }

    /// Stop the listener and the poller and wait for them to finish.
    pub async fn unload(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(error = %e, "background task panicked");
                }
            }
        }

        self.inner.state.send_replace(AccountState::Unloaded);
        info!("account unloaded");
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub fn device(&self, serial: &str) -> Result<Arc<FlatDevice>, CoreError> {
        self.inner
            .store
            .device(serial)
            .ok_or_else(|| CoreError::DeviceNotFound {
                serial: serial.to_owned(),
            })
    }

    // ── Services ─────────────────────────────────────────────────────

    pub async fn process_action(
        &self,
        serial: &str,
        action: ProcessAction,
    ) -> Result<(), CoreError> {
        services::process_action(&self.inner.client, serial, action).await
    }

    pub async fn generic_action(
        &self,
        serial: &str,
        action: &GenericAction,
    ) -> Result<(), CoreError> {
        services::generic_action(&self.inner.client, serial, action).await
    }

    pub async fn set_power(&self, serial: &str, on: bool) -> Result<(), CoreError> {
        services::set_power(&self.inner.client, serial, on).await
    }

    pub async fn set_target_temperature(
        &self,
        serial: &str,
        temperature: f64,
        zone: u8,
    ) -> Result<(), CoreError> {
        services::set_target_temperature(&self.inner.client, serial, temperature, zone).await
    }

    pub async fn raw_action(&self, serial: &str, payload: &Value) -> Result<(), CoreError> {
        services::raw(&self.inner.client, serial, payload).await
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn fetch_and_apply(&self) -> FetchOutcome {
        let outcome = self.inner.fetcher.lock().await.fetch().await;
        if let FetchOutcome::Success(ref devices) = outcome {
            self.inner.store.replace_devices(devices.clone());
        }
        outcome
    }

    async fn load_actions(&self, serial: &str) -> Result<(), CoreError> {
        let path = format!("/devices/{serial}/actions");
        let request = self.inner.client.request(
            Method::GET,
            &path,
            RequestOptions::new().header(ACCEPT, HeaderValue::from_static("application/json")),
        );

        let resp = match with_timeout(self.inner.config.fetch.read_timeout, request).await {
            Ok(resp) => resp,
            Err(e) => {
                self.set_state(AccountState::Degraded);
                return Err(CoreError::NotReady {
                    reason: format!("fetching actions for {serial}: {e}"),
                });
            }
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.set_state(AccountState::ReauthRequired);
            return Err(CoreError::AuthenticationFailed {
                message: "authentication failure when fetching actions".into(),
            });
        }
        if !status.is_success() {
            warn!(serial, status = status.as_u16(), "could not fetch actions");
            return Ok(());
        }

        match read_json(resp).await {
            Ok(actions) => self.inner.store.set_actions(serial, actions),
            Err(miele_api::Error::Deserialization { .. }) => {
                warn!(serial, "could not decode json from fetch of actions");
            }
            Err(e) => {
                self.set_state(AccountState::Degraded);
                return Err(CoreError::NotReady {
                    reason: format!("reading actions for {serial}: {e}"),
                });
            }
        }
        Ok(())
    }

    async fn spawn_tasks(&self) -> Result<(), CoreError> {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            return Err(CoreError::Internal("account is already set up".into()));
        }

        let handler = Arc::new(StoreHandler {
            store: Arc::clone(&self.inner.store),
        });
        let listener = EventListener::new(
            self.inner.client.clone(),
            handler,
            self.inner.config.listener.clone(),
        );
        let _ = self.inner.listener_state.set(listener.state());

        let cancel = self.inner.cancel.clone();
        handles.push(tokio::spawn(async move {
            let exit = listener.run(cancel).await;
            debug!(?exit, "event listener task finished");
        }));

        let interval = self.inner.config.poll_interval;
        if !interval.is_zero() {
            let account = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(poll_task(account, interval, cancel)));
        }
        Ok(())
    }

    fn reauth_pending(&self) -> bool {
        *self.inner.state.borrow() == AccountState::ReauthRequired
    }

    fn set_state(&self, state: AccountState) {
        self.inner.state.send_if_modified(|current| {
            if *current == AccountState::Unloaded || *current == state {
                return false;
            }
            debug!(previous = ?current, ?state, "account state changed");
            *current = state;
            true
        });
    }
}

fn log_classification(serial: &str, device: &FlatDevice) {
    match classify(device) {
        Classification::Supported(kind) => debug!(serial, %kind, "appliance"),
        Classification::Professional(kind) => warn!(
            serial,
            code = kind.code(),
            "appliances in (semi-)professional series are not supported by the Miele 3rd-party API"
        ),
        Classification::Unknown(code) => {
            warn!(serial, code, "appliance type is not supported");
        }
        Classification::Missing => debug!(serial, "appliance reports no type"),
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Refresh on a fixed interval until cancelled.
async fn poll_task<A: TokenProvider>(
    account: Account<A>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // setup already fetched

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = account.refresh() => {}
                }
            }
        }
    }
    debug!("poll task finished");
}

// ── Event handler ────────────────────────────────────────────────────

/// Applies pushed events to the device store.
struct StoreHandler {
    store: Arc<DeviceStore>,
}

impl EventHandler for StoreHandler {
    fn on_devices(
        &self,
        payload: Value,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        let store = Arc::clone(&self.store);
        async move {
            let devices = flatten_devices(&payload).map_err(|e| -> HandlerError {
                format!("failed to process pushed data: {e}").into()
            })?;
            debug!(devices = devices.len(), "applying pushed device state");
            store.upsert_devices(devices);
            Ok(())
        }
    }

    fn on_actions(
        &self,
        payload: Value,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        let store = Arc::clone(&self.store);
        async move {
            let Value::Object(actions) = payload else {
                return Err("actions event is not keyed by serial number".into());
            };
            debug!(devices = actions.len(), "applying pushed actions");
            store.upsert_actions(actions);
            Ok(())
        }
    }
}
