// vwlink-api: Async Rust client for the Volkswagen connected-vehicle cloud API

pub mod auth;
pub mod client;
pub mod commands;
pub mod error;
pub mod models;
pub mod na;
pub mod session;
pub mod status;
pub mod token_store;
pub mod transport;

pub use auth::{Credentials, Spin, TokenSet};
pub use client::VehicleClient;
pub use commands::{CommandAck, CommandRequest, RemoteStatus};
pub use error::Error;
pub use session::{ApiRequest, Endpoints, Region, Session};
pub use token_store::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore, TokenStoreError};
pub use transport::{TlsMode, TransportConfig};
