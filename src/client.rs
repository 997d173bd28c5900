//! Relay client
//!
//! Minimal async client for the relay protocol: connect, create or join a
//! channel, then exchange chat messages. Used by the `relay_client` binary
//! and by the end-to-end tests.

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::debug;

use crate::error::AppError;
use crate::message::{ClientRequest, ServerMessage};
use crate::types::{timestamp_now, ChannelId};

/// Result of a successful create or join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub channel_name: String,
    pub channel_id: ChannelId,
    /// Display name assigned by the server (requested name plus suffix)
    pub member_name: String,
}

/// Connected client, before or after joining a channel
pub struct RelayClient {
    receiver: RelayReceiver,
    sender: RelaySender,
}

/// Inbound half of a client connection
pub struct RelayReceiver {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
}

/// Outbound half of a client connection
pub struct RelaySender {
    writer: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

impl RelayClient {
    /// Connect to a relay server
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        let (read, write) = stream.into_split();
        Ok(Self {
            receiver: RelayReceiver {
                reader: FramedRead::new(read, LinesCodec::new()),
            },
            sender: RelaySender {
                writer: FramedWrite::new(write, LinesCodec::new()),
            },
        })
    }

    /// Create a channel; the server joins the creator automatically
    pub async fn create_channel(
        &mut self,
        channel_name: &str,
        channel_password: &str,
        member_name: &str,
    ) -> Result<JoinOutcome, AppError> {
        self.sender
            .request(&ClientRequest::CreateChannel {
                channel_name: channel_name.to_string(),
                channel_password: channel_password.to_string(),
                member_name: member_name.to_string(),
            })
            .await?;

        match self.receiver.expect_frame().await? {
            ServerMessage::CreateChannel { success: true, .. } => {}
            other => return Err(rejection(other)),
        }
        self.receiver.expect_joined().await
    }

    /// Join an existing channel
    pub async fn join_channel(
        &mut self,
        channel_name: &str,
        channel_password: &str,
        member_name: &str,
    ) -> Result<JoinOutcome, AppError> {
        self.sender
            .request(&ClientRequest::JoinChannel {
                channel_name: channel_name.to_string(),
                channel_password: channel_password.to_string(),
                member_name: member_name.to_string(),
            })
            .await?;
        self.receiver.expect_joined().await
    }

    /// Send a chat message to the joined channel
    pub async fn send_message(&mut self, text: &str) -> Result<(), AppError> {
        self.sender.send_message(text).await
    }

    /// Next frame from the server; `None` once the server closed the connection
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, AppError> {
        self.receiver.next_message().await
    }

    /// Split into independently usable halves
    pub fn into_split(self) -> (RelayReceiver, RelaySender) {
        (self.receiver, self.sender)
    }
}

impl RelayReceiver {
    /// Next frame from the server; `None` once the server closed the connection
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, AppError> {
        match self.reader.next().await {
            Some(Ok(line)) => Ok(Some(serde_json::from_str(&line)?)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    async fn expect_frame(&mut self) -> Result<ServerMessage, AppError> {
        self.next_message()
            .await?
            .ok_or_else(|| AppError::Handshake("server closed the connection"))
    }

    async fn expect_joined(&mut self) -> Result<JoinOutcome, AppError> {
        match self.expect_frame().await? {
            ServerMessage::JoinChannel {
                success: true,
                channel_name: Some(channel_name),
                channel_id: Some(channel_id),
                member_name: Some(member_name),
                ..
            } => Ok(JoinOutcome {
                channel_name,
                channel_id,
                member_name,
            }),
            other => Err(rejection(other)),
        }
    }
}

impl RelaySender {
    /// Send a chat message, stamped with local time
    ///
    /// The server replaces the stamp with its own before fan-out.
    pub async fn send_message(&mut self, text: &str) -> Result<(), AppError> {
        self.request(&ClientRequest::Message {
            message: text.to_string(),
            timestamp: Some(timestamp_now()),
        })
        .await
    }

    async fn request(&mut self, request: &ClientRequest) -> Result<(), AppError> {
        let line = serde_json::to_string(request)?;
        debug!("Sending {}", line);
        self.writer.send(line).await?;
        Ok(())
    }
}

/// Turn an unsuccessful or unexpected handshake frame into an error
fn rejection(msg: ServerMessage) -> AppError {
    match msg {
        ServerMessage::CreateChannel {
            success: false,
            message,
        }
        | ServerMessage::JoinChannel {
            success: false,
            message,
            ..
        }
        | ServerMessage::Error { message, .. } => AppError::Rejected(message),
        other => AppError::UnexpectedResponse(format!("{:?}", other)),
    }
}
