// Authenticated async HTTP client for the Miele 3rd-party API.
//
// Base path: /v1
// Auth: `Authorization: Bearer <token>`, token fetched per request

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Deadline for the mutation helpers (`send_action`, `set_target_temperature`).
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

// ── Request options ──────────────────────────────────────────────────

/// Per-call options for [`MieleClient::request`].
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    headers: HeaderMap,
    body: Option<Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. Any `Authorization` header is replaced by the bearer token.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Send `body` as JSON (`Content-Type: application/json` unless overridden).
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for the Miele cloud API.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted
/// and the token provider is shared behind an `Arc`.
pub struct MieleClient<A> {
    http: reqwest::Client,
    base_url: Url,
    auth: Arc<A>,
}

impl<A> Clone for MieleClient<A> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<A: TokenProvider> MieleClient<A> {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client with its own `reqwest::Client` from `transport`.
    pub fn new(base_url: &str, auth: A, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, Url::parse(base_url)?, Arc::new(auth)))
    }

    /// Wrap an existing `reqwest::Client` and a shared token provider.
    pub fn with_client(http: reqwest::Client, base_url: Url, auth: Arc<A>) -> Self {
        Self {
            http,
            base_url,
            auth,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    /// Append `path` (which may carry a query string) to the base URL.
    ///
    /// Plain concatenation rather than `Url::join`, so the `/v1` prefix of
    /// the base URL survives absolute endpoint paths.
    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    // ── Raw request ──────────────────────────────────────────────────

    /// Issue an authenticated request against `base_url + path`.
    ///
    /// A fresh token is requested from the provider for every call. Does not
    /// retry and does not inspect the status: non-2xx responses are returned
    /// as-is for the caller to examine.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let url = self.url(path)?;
        let token = self.auth.access_token().await?;

        let mut headers = options.headers;
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| Error::InvalidHeader {
                name: AUTHORIZATION.to_string(),
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        debug!("{method} {url}");

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(ref body) = options.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    // ── Capability queries ───────────────────────────────────────────

    /// Fetch the action capabilities of one appliance.
    pub async fn get_actions(&self, serial: &str) -> Result<Value, Error> {
        let resp = self
            .request(
                Method::GET,
                &format!("/devices/{serial}/actions"),
                RequestOptions::new().header(ACCEPT, HeaderValue::from_static("application/json")),
            )
            .await?;
        let resp = ensure_success(resp).await?;
        read_json(resp).await
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// PUT an action payload to `/devices/{serial}/actions`.
    ///
    /// Unlike [`request`](Self::request), any non-2xx status is turned into
    /// [`Error::Status`]. Bounded by [`ACTION_TIMEOUT`].
    pub async fn send_action(&self, serial: &str, payload: &Value) -> Result<Response, Error> {
        debug!(serial, %payload, "sending action");
        let path = format!("/devices/{serial}/actions");
        with_timeout(ACTION_TIMEOUT, async {
            let resp = self
                .request(
                    Method::PUT,
                    &path,
                    RequestOptions::new()
                        .header(ACCEPT, HeaderValue::from_static("application/json"))
                        .json(payload.clone()),
                )
                .await?;
            ensure_success(resp).await
        })
        .await
    }

    /// Set the target temperature of one zone, rounded to a whole degree.
    ///
    /// Rounds half to even, so `20.5` becomes `20` and `21.5` becomes `22`.
    pub async fn set_target_temperature(
        &self,
        serial: &str,
        temperature: f64,
        zone: u8,
    ) -> Result<Response, Error> {
        let payload = target_temperature_payload(temperature, zone);
        self.send_action(serial, &payload).await
    }
}

// ── Response helpers ─────────────────────────────────────────────────

/// Build the `targetTemperature` action body for one zone.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub fn target_temperature_payload(temperature: f64, zone: u8) -> Value {
    let rounded = temperature.round_ties_even() as i64;
    json!({ "targetTemperature": [{ "zone": zone, "value": rounded }] })
}

/// Turn a non-2xx response into [`Error::Status`], keeping the body as message.
pub async fn ensure_success(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_owned()
    } else {
        body
    };
    Err(Error::Status {
        status: status.as_u16(),
        message,
    })
}

/// Read the full body and decode it as JSON.
pub async fn read_json(resp: Response) -> Result<Value, Error> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Run `fut` under a deadline, mapping expiry to [`Error::Timeout`].
pub async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: limit.as_secs(),
        })?
}
