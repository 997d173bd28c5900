//! Member outbound handle
//!
//! A channel never writes to a socket directly. Each member is reachable
//! through a bounded queue drained by its connection's writer task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::OwnedPermit;

use crate::error::SendError;
use crate::message::ServerMessage;

/// Outbound side of a joined member's transport
///
/// Cheap to clone; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    sender: mpsc::Sender<ServerMessage>,
}

impl MemberHandle {
    /// Wrap the sending half of a connection's outbound queue
    pub fn new(sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { sender }
    }

    /// Queue a message without waiting
    ///
    /// Fails if the writer has gone away or the member is too far behind.
    pub fn try_deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Backlogged,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Queue a message, waiting for capacity
    pub async fn deliver(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Whether both handles feed the same writer
    pub fn is_same(&self, other: &MemberHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// Hold one queue slot for a join confirmation, waiting for capacity
    pub async fn reserve(&self) -> Result<PendingMember, SendError> {
        self.sender
            .clone()
            .reserve_owned()
            .await
            .map(PendingMember::new)
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// A member about to join, with a queue slot already held
///
/// Confirming never waits and never fails for lack of capacity, so it is
/// safe under a channel lock.
#[derive(Debug)]
pub struct PendingMember {
    slot: OwnedPermit<ServerMessage>,
}

impl PendingMember {
    pub fn new(slot: OwnedPermit<ServerMessage>) -> Self {
        Self { slot }
    }

    /// Queue the confirmation into the held slot and hand back the member
    pub fn confirm(self, msg: ServerMessage) -> MemberHandle {
        MemberHandle::new(self.slot.send(msg))
    }
}
