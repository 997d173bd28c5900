//! Channel Relay Library
//!
//! A chat relay over plain TCP: clients create or join named,
//! password-protected channels and every chat message is fanned out to
//! all current members of the channel, sender included.
//!
//! # Features
//! - Newline-delimited JSON protocol
//! - Channel creation with automatic join of the creator
//! - Password-checked channel joining
//! - Unique per-channel display names (random suffix)
//! - Broadcast that drops broken or backlogged members
//! - Graceful shutdown that closes every live connection
//!
//! # Architecture
//! Shared state guarded by short, non-async locks:
//! - `Registry` maps channel names to `Channel`s and hands out ids
//! - `Channel` owns its member map and performs the fan-out
//! - Each connection runs a `handler` task plus a writer task fed by a
//!   bounded queue, so a slow client never stalls a broadcast
//!
//! # Example
//! ```ignore
//! use channel_relay::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::bind(Config::default()).await.unwrap();
//!     server.run(async { tokio::signal::ctrl_c().await.unwrap() }).await.unwrap();
//! }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod member;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use channel::{BroadcastReport, Channel};
pub use client::{JoinOutcome, RelayClient};
pub use config::Config;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use member::{MemberHandle, PendingMember};
pub use message::{ClientRequest, ServerMessage};
pub use registry::Registry;
pub use server::Server;
pub use types::{ChannelId, ConnectionId};
