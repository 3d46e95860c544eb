// miele-core: Polling, event-stream and device-state layer between miele-api and consumers.

pub mod account;
pub mod appliance;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod flatten;
pub mod services;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use account::{Account, AccountState};
pub use appliance::{ApplianceType, Classification, classify};
pub use config::{AccountConfig, FetchPolicy};
pub use error::CoreError;
pub use fetcher::{FetchFailure, FetchOutcome, Fetcher, RetryCounters};
pub use flatten::{DeviceMap, FlatDevice, FlattenError, flatten, flatten_devices};
pub use services::{AmbientColor, GenericAction, ProcessAction};
pub use store::DeviceStore;

// Consumers build clients and token providers without a direct miele-api dependency.
pub use miele_api::{
    ListenerConfig, ListenerState, MIELE_API, MieleClient, StaticToken, TokenProvider,
    TransportConfig,
};
