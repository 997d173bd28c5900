//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based identifier for an accepted connection
//! - `ChannelId`: registry-assigned, monotonically increasing channel id
//!
//! Also hosts the small random/time helpers the handshake and relay use.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Only used to correlate log lines for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel identifier assigned by the registry at creation
///
/// Serialized as a bare number (`"channelId": 3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// URL-safe base64 alphabet used for member name suffixes
const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// 11 symbols of 6 bits each covers 8 random bytes
const SUFFIX_LEN: usize = 11;

/// Generate a random suffix appended to a member's requested name
pub fn generate_member_suffix() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Current local wall-clock time as `HH:MM:SS`
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
