//! Channel state: membership and broadcast
//!
//! A channel's id, name, password and owner are fixed at creation.
//! Only the member map changes, and only under the channel's own lock.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::member::{MemberHandle, PendingMember};
use crate::message::ServerMessage;
use crate::types::{generate_member_suffix, ChannelId};

/// Named, optionally password-protected broadcast group
///
/// Channels are shared between connection handlers through `Arc<Channel>`.
/// The member map is the only mutable part.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    name: String,
    /// Empty means no password required
    password: String,
    /// Requested (unsuffixed) name of the creator
    owner: String,
    /// Assigned display name -> outbound handle
    members: Mutex<HashMap<String, MemberHandle>>,
}

/// Outcome of one fan-out pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members the message was queued for
    pub delivered: usize,
    /// Members removed because delivery failed
    pub pruned: Vec<String>,
}

impl Channel {
    /// Create an empty channel
    pub fn new(id: ChannelId, name: String, password: String, owner: String) -> Self {
        Self {
            id,
            name,
            password,
            owner,
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Number of currently joined members
    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Snapshot of the currently joined display names
    pub fn member_names(&self) -> Vec<String> {
        self.members.lock().keys().cloned().collect()
    }

    /// Check if a display name is currently joined
    pub fn contains(&self, display_name: &str) -> bool {
        self.members.lock().contains_key(display_name)
    }

    /// Check a supplied password against the stored one
    pub fn password_matches(&self, supplied: &str) -> bool {
        self.password == supplied
    }

    /// Join the channel
    ///
    /// Returns the assigned display name: the requested name plus a random
    /// suffix, plus `_N` if that still collides. The join confirmation goes
    /// into the member's held queue slot as its first message.
    pub fn join(
        &self,
        requested_name: &str,
        supplied_password: &str,
        member: PendingMember,
    ) -> Result<String, AppError> {
        self.join_with_suffix(
            requested_name,
            supplied_password,
            &generate_member_suffix(),
            member,
        )
    }

    fn join_with_suffix(
        &self,
        requested_name: &str,
        supplied_password: &str,
        suffix: &str,
        member: PendingMember,
    ) -> Result<String, AppError> {
        if !self.password_matches(supplied_password) {
            return Err(AppError::WrongPassword(self.name.clone()));
        }
        if requested_name.is_empty() {
            return Err(AppError::MissingName);
        }

        let base = format!("{}_{}", requested_name, suffix);

        // Name selection and insertion happen under one lock acquisition
        let mut members = self.members.lock();
        let mut assigned = base.clone();
        let mut count = 0u32;
        while members.contains_key(&assigned) {
            count += 1;
            assigned = format!("{}_{}", base, count);
        }

        // Queued before insertion so no chat can overtake the confirmation
        let handle = member.confirm(ServerMessage::channel_joined(&self.name, self.id, &assigned));
        members.insert(assigned.clone(), handle);

        info!(
            "Member {} joined channel {} ({} active)",
            assigned,
            self.name,
            members.len()
        );

        Ok(assigned)
    }

    /// Remove a member if present
    ///
    /// Returns true if the member was removed by this call.
    pub fn leave(&self, display_name: &str) -> bool {
        let removed = self.members.lock().remove(display_name).is_some();
        if removed {
            info!("Removed {} from channel {}", display_name, self.name);
        }
        removed
    }

    /// Fan a chat message out to every member, sender included
    ///
    /// Members whose outbound queue is closed or full are removed after
    /// the pass. No lock is held while delivering.
    pub fn broadcast(&self, sender_name: &str, payload: &str, timestamp: &str) -> BroadcastReport {
        let msg = ServerMessage::Chat {
            message: payload.to_string(),
            member_name: sender_name.to_string(),
            timestamp: timestamp.to_string(),
        };

        let recipients: Vec<(String, MemberHandle)> = self
            .members
            .lock()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        debug!(
            "Broadcasting message from {} to {} members of {}",
            sender_name,
            recipients.len(),
            self.name
        );

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (name, handle) in recipients {
            match handle.try_deliver(msg.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to send message to {}: {}", name, e);
                    failed.push((name, handle));
                }
            }
        }

        if !failed.is_empty() {
            report.pruned = self.prune(failed);
        }
        report
    }

    /// Remove failed members that still map to the handle that failed
    ///
    /// A member that already left (or whose name was reused) is skipped.
    fn prune(&self, failed: Vec<(String, MemberHandle)>) -> Vec<String> {
        let mut members = self.members.lock();
        let mut pruned = Vec::new();
        for (name, handle) in failed {
            let still_there = members
                .get(&name)
                .is_some_and(|current| current.is_same(&handle));
            if still_there {
                members.remove(&name);
                info!("Removed disconnected member {} from {}", name, self.name);
                pruned.push(name);
            }
        }
        pruned
    }
}
