//! Line-based relay client
//!
//! Usage: `relay_client <host:port> <create|join> <channel> <password> <name>`
//!
//! Each stdin line is sent as a chat message; incoming messages are
//! printed as `[HH:MM:SS] name: text`. Pass "" for an open channel.

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use channel_relay::{RelayClient, ServerMessage};

const USAGE: &str = "usage: relay_client <host:port> <create|join> <channel> <password> <name>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [addr, action, channel, password, name] = args.as_slice() else {
        return Err(USAGE.into());
    };

    let mut client = RelayClient::connect(addr.as_str()).await?;
    let joined = match action.as_str() {
        "create" => client.create_channel(channel, password, name).await?,
        "join" => client.join_channel(channel, password, name).await?,
        _ => return Err(USAGE.into()),
    };
    println!(
        "Joined channel {} (id {}) as {}",
        joined.channel_name, joined.channel_id, joined.member_name
    );

    let (mut receiver, mut sender) = client.into_split();

    let mut printer = tokio::spawn(async move {
        loop {
            match receiver.next_message().await {
                Ok(Some(ServerMessage::Chat {
                    message,
                    member_name,
                    timestamp,
                })) => {
                    if !message.is_empty() {
                        println!("[{}] {}: {}", timestamp, member_name, message);
                    }
                }
                Ok(Some(other)) => debug!("Ignoring {:?}", other),
                Ok(None) => {
                    println!("Disconnected from server.");
                    break;
                }
                Err(e) => {
                    error!("Connection error: {}", e);
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let text = line.trim();
                    if !text.is_empty() {
                        sender.send_message(text).await?;
                    }
                }
                None => break,
            },
            _ = &mut printer => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
