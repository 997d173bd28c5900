//! End-to-end scenarios against a real TCP listener

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use channel_relay::{AppError, ChannelId, Config, Registry, RelayClient, Server, ServerMessage};

struct Running {
    addr: SocketAddr,
    registry: Registry,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), AppError>>,
}

async fn start_server() -> Running {
    let config = Config {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    let (stop, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));
    Running {
        addr,
        registry,
        stop,
        task,
    }
}

async fn next_chat(client: &mut RelayClient) -> (String, String, String) {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next_message())
        .await
        .expect("timed out waiting for chat")
        .unwrap();
    match msg {
        Some(ServerMessage::Chat {
            message,
            member_name,
            timestamp,
        }) => (message, member_name, timestamp),
        other => panic!("Expected chat, got {:?}", other),
    }
}

#[tokio::test]
async fn general_channel_scenario() {
    let server = start_server().await;

    let mut alice = RelayClient::connect(server.addr).await.unwrap();
    let alice_join = alice.create_channel("general", "pw1", "alice").await.unwrap();
    assert_eq!(alice_join.channel_name, "general");
    assert!(alice_join.member_name.starts_with("alice_"));

    let mut bob = RelayClient::connect(server.addr).await.unwrap();
    let bob_join = bob.join_channel("general", "pw1", "bob").await.unwrap();
    assert_eq!(bob_join.channel_id, alice_join.channel_id);
    assert!(bob_join.member_name.starts_with("bob_"));

    let mut carol = RelayClient::connect(server.addr).await.unwrap();
    let err = carol.join_channel("general", "wrong", "carol").await.unwrap_err();
    assert!(matches!(err, AppError::Rejected(ref m) if m == "channel password is incorrect"));

    let channel = server.registry.lookup("general").unwrap();
    assert_eq!(channel.member_count(), 2);
    assert!(channel
        .member_names()
        .iter()
        .all(|name| !name.starts_with("carol")));

    alice.send_message("hi").await.unwrap();

    for client in [&mut alice, &mut bob] {
        let (message, member_name, timestamp) = next_chat(client).await;
        assert_eq!(message, "hi");
        assert_eq!(member_name, alice_join.member_name);
        assert_eq!(timestamp.len(), 8);
        assert_eq!(timestamp.matches(':').count(), 2);
    }

    server.stop.send(()).unwrap();
    assert!(server.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn channel_ids_increase_and_duplicates_fail() {
    let server = start_server().await;

    let mut ids = Vec::new();
    for name in ["one", "two", "three"] {
        let mut client = RelayClient::connect(server.addr).await.unwrap();
        ids.push(client.create_channel(name, "", "owner").await.unwrap().channel_id);
    }
    assert_eq!(ids, vec![ChannelId(1), ChannelId(2), ChannelId(3)]);

    let mut late = RelayClient::connect(server.addr).await.unwrap();
    let err = late.create_channel("two", "other", "late").await.unwrap_err();
    assert!(matches!(err, AppError::Rejected(ref m) if m == "channel already exists"));

    let two = server.registry.lookup("two").unwrap();
    assert_eq!(two.id(), ChannelId(2));
    assert_eq!(two.owner(), "owner");
    assert!(two.password_matches(""));

    let mut nobody = RelayClient::connect(server.addr).await.unwrap();
    let err = nobody.join_channel("missing", "", "x").await.unwrap_err();
    assert!(matches!(err, AppError::Rejected(ref m) if m == "channel does not exist"));
    assert!(server.registry.lookup("missing").is_err());
}

#[tokio::test]
async fn concurrent_joins_get_distinct_names() {
    let server = start_server().await;

    let mut owner = RelayClient::connect(server.addr).await.unwrap();
    owner.create_channel("busy", "", "owner").await.unwrap();

    let joins: Vec<_> = (0..20)
        .map(|_| {
            let addr = server.addr;
            tokio::spawn(async move {
                let mut client = RelayClient::connect(addr).await.unwrap();
                let joined = client.join_channel("busy", "", "same").await.unwrap();
                (joined.member_name, client)
            })
        })
        .collect();

    let mut names = Vec::new();
    let mut clients = Vec::new();
    for join in joins {
        let (name, client) = join.await.unwrap();
        names.push(name);
        clients.push(client);
    }
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 20);
    assert_eq!(server.registry.lookup("busy").unwrap().member_count(), 21);
}

#[tokio::test]
async fn departed_member_no_longer_receives() {
    let server = start_server().await;

    let mut alice = RelayClient::connect(server.addr).await.unwrap();
    alice.create_channel("room", "", "alice").await.unwrap();
    let mut bob = RelayClient::connect(server.addr).await.unwrap();
    let bob_join = bob.join_channel("room", "", "bob").await.unwrap();
    let channel = server.registry.lookup("room").unwrap();

    drop(bob);

    // Either disconnect cleanup or broadcast pruning removes bob
    let mut attempts = 0;
    while channel.contains(&bob_join.member_name) {
        attempts += 1;
        assert!(attempts < 100, "bob was never removed");
        alice.send_message("ping").await.unwrap();
        next_chat(&mut alice).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    alice.send_message("after").await.unwrap();
    let (message, _, _) = next_chat(&mut alice).await;
    assert_eq!(message, "after");
    assert_eq!(channel.member_count(), 1);

    // Empty channels are kept
    drop(alice);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.registry.lookup("room").is_ok());
}
