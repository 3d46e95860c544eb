// miele-api: Async Rust client for the Miele 3rd-party cloud API (REST + event stream)

pub mod auth;
pub mod client;
pub mod error;
pub mod events;
pub mod transport;

pub use auth::{StaticToken, TokenProvider};
pub use client::{ACTION_TIMEOUT, MieleClient, RequestOptions};
pub use error::Error;
pub use events::{
    Callbacks, EventHandler, EventListener, HandlerError, ListenerConfig, ListenerExit,
    ListenerState, StreamEvent,
};
pub use transport::{MIELE_API, TransportConfig};

// Re-exported so callers can build requests without depending on reqwest directly.
pub use reqwest::{Method, Response, StatusCode, header};
