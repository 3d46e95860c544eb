//! Server-Sent-Events listener with fixed-delay reconnect.
//!
//! Subscribes to `GET /devices/all/events` and dispatches each frame to an
//! [`EventHandler`]. The stream is framed as exactly three lines per event:
//!
//! ```text
//! event: devices
//! data: {"711934968": {"ident": {...}, "state": {...}}}
//!
//! ```
//!
//! `devices` and `actions` frames carry a JSON payload starting at byte
//! offset 6 of the data line; `ping` frames carry nothing and only keep the
//! connection alive.
//!
//! Any connection, read, or decode error leads to a fixed delay followed by
//! a fresh connection (with a freshly requested token). A clean close by the
//! server ends the listener. Cancellation goes through a
//! [`CancellationToken`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use miele_api::events::{Callbacks, EventListener, ListenerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let handler = Arc::new(Callbacks::new(
//!     |devices| async move { println!("devices: {devices}"); Ok(()) },
//!     |actions| async move { println!("actions: {actions}"); Ok(()) },
//! ));
//! let cancel = CancellationToken::new();
//! let listener = EventListener::new(client.clone(), handler, ListenerConfig::default());
//! tokio::spawn(listener.run(cancel.clone()));
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::auth::TokenProvider;
use crate::client::{MieleClient, RequestOptions, ensure_success, with_timeout};
use crate::error::Error;

/// Endpoint streaming events for every appliance on the account.
pub const EVENTS_PATH: &str = "/devices/all/events";

/// Byte offset of the JSON payload within a `data: ` line.
const DATA_OFFSET: usize = 6;

// ── Handler ──────────────────────────────────────────────────────────

/// Error type returned by event callbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver of parsed stream payloads.
///
/// Each call runs as its own task, so implementations must be safe to
/// invoke concurrently with themselves and with each other. Completion
/// order is not guaranteed to match arrival order.
pub trait EventHandler: Send + Sync + 'static {
    /// Called with the payload of a `devices` frame.
    fn on_devices(&self, payload: Value) -> impl Future<Output = Result<(), HandlerError>> + Send;

    /// Called with the payload of an `actions` frame.
    fn on_actions(&self, payload: Value) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// [`EventHandler`] built from two async closures.
pub struct Callbacks<D, C> {
    data_callback: D,
    actions_callback: C,
}

impl<D, C> Callbacks<D, C> {
    pub fn new(data_callback: D, actions_callback: C) -> Self {
        Self {
            data_callback,
            actions_callback,
        }
    }
}

impl<D, DF, C, CF> EventHandler for Callbacks<D, C>
where
    D: Fn(Value) -> DF + Send + Sync + 'static,
    DF: Future<Output = Result<(), HandlerError>> + Send + 'static,
    C: Fn(Value) -> CF + Send + Sync + 'static,
    CF: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn on_devices(&self, payload: Value) -> impl Future<Output = Result<(), HandlerError>> + Send {
        (self.data_callback)(payload)
    }

    fn on_actions(&self, payload: Value) -> impl Future<Output = Result<(), HandlerError>> + Send {
        (self.actions_callback)(payload)
    }
}

// ── Frames ───────────────────────────────────────────────────────────

/// A decoded stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Full state snapshot of one or more appliances, keyed by serial.
    Devices(Value),
    /// Action capabilities of one or more appliances, keyed by serial.
    Actions(Value),
    /// Keep-alive marker.
    Ping,
}

/// Decode one frame from its `event:` and `data:` lines.
///
/// Returns `Ok(None)` for an unknown event type, which is logged and
/// otherwise ignored. A payload that is not valid JSON is an error.
pub fn parse_frame(event_line: &str, data_line: &str) -> Result<Option<StreamEvent>, Error> {
    match event_line.strip_prefix("event: ") {
        Some("ping") => Ok(Some(StreamEvent::Ping)),
        Some("devices") => decode_payload(data_line).map(|v| Some(StreamEvent::Devices(v))),
        Some("actions") => decode_payload(data_line).map(|v| Some(StreamEvent::Actions(v))),
        _ => {
            error!(line = event_line, "unknown event type on event stream");
            Ok(None)
        }
    }
}

fn decode_payload(data_line: &str) -> Result<Value, Error> {
    let payload = data_line.get(DATA_OFFSET..).unwrap_or_default();
    serde_json::from_str(payload).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: payload.to_owned(),
    })
}

struct RawFrame {
    event: String,
    data: String,
}

/// Read the next three-line frame. `Ok(None)` means the server closed the
/// stream; a frame cut short by the close is dropped.
async fn read_frame<R>(lines: &mut Lines<R>) -> Result<Option<RawFrame>, Error>
where
    R: AsyncBufRead + Unpin,
{
    let Some(event) = lines.next_line().await? else {
        return Ok(None);
    };
    let Some(data) = lines.next_line().await? else {
        return Ok(None);
    };
    if lines.next_line().await?.is_none() {
        return Ok(None);
    }
    Ok(Some(RawFrame { event, data }))
}

// ── ListenerConfig ───────────────────────────────────────────────────

/// Timing knobs for the listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Pause between a failure and the next connection attempt. Default: 5s.
    pub reconnect_delay: Duration,

    /// Bound on opening the stream (until response headers arrive).
    /// Reading the body is never time-bounded. Default: 30s.
    pub connect_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

// ── State ────────────────────────────────────────────────────────────

/// Observable listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Connecting,
    Streaming,
    ReconnectWait,
    /// Terminal: stopped through the cancellation token.
    Cancelled,
    /// Terminal: the server closed the stream cleanly.
    Closed,
}

/// Why [`EventListener::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    Cancelled,
    StreamClosed,
}

// ── EventListener ────────────────────────────────────────────────────

type CallbackOutcome = (&'static str, Result<(), HandlerError>);

/// Long-lived subscription to the account's event stream.
pub struct EventListener<A, H> {
    client: MieleClient<A>,
    handler: Arc<H>,
    config: ListenerConfig,
    state: watch::Sender<ListenerState>,
}

impl<A: TokenProvider, H: EventHandler> EventListener<A, H> {
    pub fn new(client: MieleClient<A>, handler: Arc<H>, config: ListenerConfig) -> Self {
        let (state, _) = watch::channel(ListenerState::Connecting);
        Self {
            client,
            handler,
            config,
            state,
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Run until cancelled or until the server closes the stream cleanly.
    ///
    /// No error is fatal: every failure is logged and followed by
    /// `reconnect_delay` and a new connection attempt.
    pub async fn run(self, cancel: CancellationToken) -> ListenerExit {
        let mut callbacks: JoinSet<CallbackOutcome> = JoinSet::new();
        let mut attempt: u32 = 0;

        let exit = loop {
            self.set_state(ListenerState::Connecting);

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break ListenerExit::Cancelled,
                result = self.connect_and_read(&mut callbacks) => result,
            };

            match result {
                Ok(()) => {
                    info!("event stream closed by server");
                    break ListenerExit::StreamClosed;
                }
                Err(e) => {
                    attempt += 1;
                    let delay_ms =
                        u64::try_from(self.config.reconnect_delay.as_millis()).unwrap_or(u64::MAX);
                    if e.is_transient() {
                        warn!(error = %e, attempt, delay_ms, "event stream failed, reconnecting");
                    } else {
                        error!(error = %e, attempt, delay_ms, "event stream failed, reconnecting");
                    }
                    self.set_state(ListenerState::ReconnectWait);

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break ListenerExit::Cancelled,
                        () = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        };

        match exit {
            ListenerExit::Cancelled => {
                callbacks.shutdown().await;
                self.set_state(ListenerState::Cancelled);
            }
            ListenerExit::StreamClosed => {
                while let Some(joined) = callbacks.join_next().await {
                    log_callback_outcome(joined);
                }
                self.set_state(ListenerState::Closed);
            }
        }

        debug!(?exit, "event listener exiting");
        exit
    }

    /// One connection: open the stream, then read frames until it ends.
    async fn connect_and_read(&self, callbacks: &mut JoinSet<CallbackOutcome>) -> Result<(), Error> {
        info!(path = EVENTS_PATH, "connecting to event stream");

        let open = self.client.request(
            Method::GET,
            EVENTS_PATH,
            RequestOptions::new().header(ACCEPT, HeaderValue::from_static("text/event-stream")),
        );
        let resp = with_timeout(self.config.connect_timeout, open).await?;
        let resp = ensure_success(resp).await?;

        info!("event stream connected");
        self.set_state(ListenerState::Streaming);

        let body = Box::pin(resp.bytes_stream().map_err(std::io::Error::other));
        let mut lines = StreamReader::new(body).lines();

        loop {
            while let Some(joined) = callbacks.try_join_next() {
                log_callback_outcome(joined);
            }

            let Some(frame) = read_frame(&mut lines).await? else {
                return Ok(());
            };

            match parse_frame(&frame.event, &frame.data)? {
                Some(StreamEvent::Devices(payload)) => {
                    debug!("devices event received");
                    let handler = Arc::clone(&self.handler);
                    callbacks.spawn(async move { ("devices", handler.on_devices(payload).await) });
                }
                Some(StreamEvent::Actions(payload)) => {
                    debug!("actions event received");
                    let handler = Arc::clone(&self.handler);
                    callbacks.spawn(async move { ("actions", handler.on_actions(payload).await) });
                }
                Some(StreamEvent::Ping) => trace!("event stream ping"),
                None => {}
            }
        }
    }

    fn set_state(&self, state: ListenerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "event listener state changed");
        }
    }
}

impl<A: TokenProvider> MieleClient<A> {
    /// Listen with default timing until cancelled or closed by the server.
    pub async fn listen_events<H: EventHandler>(
        &self,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> ListenerExit {
        EventListener::new(self.clone(), handler, ListenerConfig::default())
            .run(cancel)
            .await
    }
}

fn log_callback_outcome(joined: Result<CallbackOutcome, JoinError>) {
    match joined {
        Ok((_, Ok(()))) => {}
        Ok((event, Err(e))) => warn!(event, error = %e, "event callback failed"),
        Err(e) if e.is_panic() => error!(error = %e, "event callback panicked"),
        Err(_) => {}
    }
}

// ── Tests ────────────────────────────────────────────────────────────
