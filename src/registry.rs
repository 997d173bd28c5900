//! Channel registry
//!
//! Process-wide map from channel name to channel, plus the id counter.
//! Both live under one lock so a create and its id increment are a
//! single step. Channels are never removed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::AppError;
use crate::types::ChannelId;

#[derive(Debug)]
struct RegistryState {
    /// All channels: name -> Channel
    channels: HashMap<String, Arc<Channel>>,
    /// Id handed to the next successful create
    next_id: u64,
}

/// Shared registry of all channels
///
/// Cloning is cheap: every clone refers to the same state.
#[derive(Debug, Clone)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry; the first channel gets id 1
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                channels: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    /// Create a channel
    ///
    /// Fails with `ChannelExists` if the name is taken; the existing
    /// channel is left untouched and no id is consumed.
    pub fn create(&self, name: &str, password: &str, owner: &str) -> Result<Arc<Channel>, AppError> {
        let mut state = self.state.lock();
        if state.channels.contains_key(name) {
            return Err(AppError::ChannelExists(name.to_string()));
        }

        let id = ChannelId(state.next_id);
        state.next_id += 1;

        let channel = Arc::new(Channel::new(
            id,
            name.to_string(),
            password.to_string(),
            owner.to_string(),
        ));
        state.channels.insert(name.to_string(), Arc::clone(&channel));

        info!("Channel {} created by {} (id {})", name, owner, id);
        debug!("Total channels: {}", state.channels.len());

        Ok(channel)
    }

    /// Look up a channel by name
    pub fn lookup(&self, name: &str) -> Result<Arc<Channel>, AppError> {
        self.state
            .lock()
            .channels
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::ChannelNotFound(name.to_string()))
    }

    /// Number of channels ever created
    pub fn len(&self) -> usize {
        self.state.lock().channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
