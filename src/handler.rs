//! Connection handler
//!
//! Drives one client connection through its lifecycle:
//! handshake (create or join a channel), steady-state relay of chat
//! messages into the channel, then cleanup.
//!
//! Each connection is split into a reader (owned by the handler) and a
//! writer task that drains the member's outbound queue onto the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::config::Config;
use crate::error::AppError;
use crate::member::MemberHandle;
use crate::message::{decode_request, encode, ClientRequest, DecodeError, ServerMessage};
use crate::registry::Registry;
use crate::types::{timestamp_now, ConnectionId};

type FrameWriter<S> = FramedWrite<WriteHalf<S>, LinesCodec>;

/// A successfully joined member
struct Session {
    channel: Arc<Channel>,
    member_name: String,
}

/// Removes the member from its channel when the relay phase ends,
/// whichever way it ends.
struct MembershipGuard {
    channel: Arc<Channel>,
    member_name: String,
}

impl Drop for MembershipGuard {
    fn drop(&mut self) {
        self.channel.leave(&self.member_name);
        debug!(
            "Membership of {} in {} released",
            self.member_name,
            self.channel.name()
        );
    }
}

/// How the relay loop ended
#[derive(Debug, PartialEq, Eq)]
enum RelayEnd {
    PeerClosed,
    ReadFailed,
    WriterEnded,
    Shutdown,
}

/// Handle a new client connection
///
/// Runs until the peer disconnects, the transport fails, the member is
/// dropped from its channel, or the server shuts down. Handshake
/// rejections are reported to the client and are not errors.
pub async fn handle_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    registry: Registry,
    config: Arc<Config>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    serve_connection(stream, peer_addr, registry, config, shutdown_rx)
        .await
        .map(|_| ())
}

/// Connection lifecycle; yields how the relay ended, or `None` if the
/// connection never got past the handshake
async fn serve_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    registry: Registry,
    config: Arc<Config>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<Option<RelayEnd>, AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let conn_id = ConnectionId::new();
    info!("Connection {} established from {}", conn_id, peer_addr);

    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(config.max_line_length),
    );
    let writer = FramedWrite::new(write_half, LinesCodec::new());

    // Server -> client queue; the writer task owns the receiving end
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);
    let mut write_task = tokio::spawn(run_writer(writer, msg_rx, config.write_timeout, conn_id));
    let outbound = MemberHandle::new(msg_tx);

    let handshake_result = tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
            info!("Connection {} closed by server shutdown during handshake", conn_id);
            write_task.abort();
            return Ok(None);
        }
        result = handshake(&mut reader, &registry, &outbound, conn_id) => result,
    };

    let session = match handshake_result {
        Ok(session) => session,
        Err(err) => {
            let outcome = reject(err, &outbound, conn_id).await;
            // Dropping the last sender lets the writer flush and close
            drop(outbound);
            let _ = write_task.await;
            info!("Connection {} from {} closed", conn_id, peer_addr);
            return outcome.map(|()| None);
        }
    };

    // From here on the channel holds the only sender
    drop(outbound);

    let guard = MembershipGuard {
        channel: Arc::clone(&session.channel),
        member_name: session.member_name.clone(),
    };

    let end = relay(&mut reader, &session, &mut write_task, &mut shutdown_rx, conn_id).await;
    info!(
        "Client {} ({}) relay ended: {:?}",
        peer_addr, session.member_name, end
    );

    drop(guard);
    drop(reader);

    match &end {
        RelayEnd::WriterEnded => {}
        RelayEnd::Shutdown => write_task.abort(),
        RelayEnd::PeerClosed | RelayEnd::ReadFailed => {
            // Senders are gone once the member left, so the writer drains and exits
            let _ = write_task.await;
        }
    }

    info!(
        "Connection with {} ({}) closed",
        peer_addr, session.member_name
    );
    Ok(Some(end))
}

/// Read and dispatch the single handshake frame
async fn handshake<R>(
    reader: &mut FramedRead<R, LinesCodec>,
    registry: &Registry,
    outbound: &MemberHandle,
    conn_id: ConnectionId,
) -> Result<Session, AppError>
where
    R: AsyncRead + Unpin,
{
    let line = match reader.next().await {
        Some(Ok(line)) => line,
        Some(Err(e)) => return Err(e.into()),
        None => return Err(AppError::Handshake("peer disconnected during handshake")),
    };

    let request = match decode_request(&line) {
        Ok(request) => request,
        Err(DecodeError::Malformed(e)) => {
            warn!("Malformed handshake from {}: {}", conn_id, e);
            return Err(AppError::Json(e));
        }
        Err(DecodeError::Unrecognized(e)) => {
            warn!("Unrecognized handshake from {}: {}", conn_id, e);
            return Err(AppError::UnknownAction);
        }
    };

    debug!("Handshake from {}: {:?}", conn_id, request);

    match request {
        ClientRequest::CreateChannel {
            channel_name,
            channel_password,
            member_name,
        } => {
            handle_create_channel(
                registry,
                outbound,
                &channel_name,
                &channel_password,
                &member_name,
            )
            .await
        }
        ClientRequest::JoinChannel {
            channel_name,
            channel_password,
            member_name,
        } => {
            let channel = registry.lookup(&channel_name)?;
            join_channel(channel, &member_name, &channel_password, outbound).await
        }
        ClientRequest::Message { .. } | ClientRequest::Unknown => Err(AppError::UnknownAction),
    }
}

/// Create a channel, confirm it, then join it as its first member
async fn handle_create_channel(
    registry: &Registry,
    outbound: &MemberHandle,
    channel_name: &str,
    channel_password: &str,
    member_name: &str,
) -> Result<Session, AppError> {
    if channel_name.is_empty() || member_name.is_empty() {
        return Err(AppError::MissingFields);
    }

    let channel = registry.create(channel_name, channel_password, member_name)?;
    outbound
        .deliver(ServerMessage::channel_created())
        .await
        .map_err(|_| AppError::ChannelSend)?;

    join_channel(channel, member_name, channel_password, outbound).await
}

/// Shared join step for both handshake paths
///
/// A queue slot is held before the channel is touched, so the channel
/// can queue the join confirmation under its lock without waiting.
async fn join_channel(
    channel: Arc<Channel>,
    member_name: &str,
    channel_password: &str,
    outbound: &MemberHandle,
) -> Result<Session, AppError> {
    let pending = outbound
        .reserve()
        .await
        .map_err(|_| AppError::ChannelSend)?;
    let assigned = channel.join(member_name, channel_password, pending)?;
    Ok(Session {
        channel,
        member_name: assigned,
    })
}

/// Report a failed handshake to the client where the protocol defines a response
async fn reject(err: AppError, outbound: &MemberHandle, conn_id: ConnectionId) -> Result<(), AppError> {
    match err {
        AppError::ChannelExists(_)
        | AppError::MissingFields
        | AppError::ChannelNotFound(_)
        | AppError::WrongPassword(_)
        | AppError::MissingName
        | AppError::UnknownAction => {
            info!("Handshake rejected for {}: {}", conn_id, err);
            let _ = outbound.deliver(ServerMessage::from(&err)).await;
            Ok(())
        }
        AppError::Json(_) | AppError::Handshake(_) => {
            debug!("Handshake abandoned by {}: {}", conn_id, err);
            Ok(())
        }
        other => Err(other),
    }
}

/// Steady-state loop: read chat frames and broadcast them
async fn relay<R>(
    reader: &mut FramedRead<R, LinesCodec>,
    session: &Session,
    write_task: &mut JoinHandle<()>,
    shutdown_rx: &mut broadcast::Receiver<()>,
    conn_id: ConnectionId,
) -> RelayEnd
where
    R: AsyncRead + Unpin,
{
    debug!(
        "Starting message handling for {} in {}",
        session.member_name,
        session.channel.name()
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return RelayEnd::Shutdown,
            _ = &mut *write_task => {
                debug!("Writer for {} ended", conn_id);
                return RelayEnd::WriterEnded;
            }
            frame = reader.next() => match frame {
                Some(Ok(line)) => relay_frame(session, &line, conn_id),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!("Frame from {} exceeds the maximum length", conn_id);
                    return RelayEnd::ReadFailed;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    warn!("Connection error with {} ({}): {}", conn_id, session.member_name, e);
                    return RelayEnd::ReadFailed;
                }
                None => {
                    info!("Client {} ({}) disconnected", conn_id, session.member_name);
                    return RelayEnd::PeerClosed;
                }
            },
        }
    }
}

/// Stamp and broadcast a single inbound frame; bad frames are skipped
fn relay_frame(session: &Session, line: &str, conn_id: ConnectionId) {
    if line.trim().is_empty() {
        return;
    }

    match decode_request(line) {
        Ok(ClientRequest::Message { message, .. }) => {
            let report = session
                .channel
                .broadcast(&session.member_name, &message, &timestamp_now());
            debug!(
                "Message from {} delivered to {} members ({} pruned)",
                session.member_name,
                report.delivered,
                report.pruned.len()
            );
        }
        Ok(other) => {
            warn!(
                "Ignoring non-message frame from {} ({}): {:?}",
                conn_id, session.member_name, other
            );
        }
        Err(e) => {
            warn!("Invalid frame from {} ({}): {}", conn_id, session.member_name, e);
        }
    }
}

/// Writer task: outbound queue -> socket
///
/// Ends when every sender is gone, a write fails, or a write takes longer
/// than `write_timeout`.
async fn run_writer<S>(
    mut writer: FrameWriter<S>,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    write_timeout: Duration,
    conn_id: ConnectionId,
) where
    S: AsyncWrite,
{
    while let Some(msg) = msg_rx.recv().await {
        let line = match encode(&msg) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize message for {}: {}", conn_id, e);
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, writer.send(line)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write to {} failed: {}", conn_id, e);
                break;
            }
            Err(_) => {
                warn!("Write to {} timed out, dropping connection", conn_id);
                break;
            }
        }
    }

    // Later deliveries fail fast so the member gets pruned
    msg_rx.close();
    let _ = tokio::time::timeout(write_timeout, SinkExt::<String>::close(&mut writer)).await;
    debug!("Write task ended for {}", conn_id);
}
