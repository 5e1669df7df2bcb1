//! Two client agents against a real lobby over loopback.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use checkers_client::infrastructure::discovery::LanProbe;
use checkers_client::infrastructure::network::{AgentConfig, ProtocolAgent};
use checkers_core::{Move, PlayerIdentity};
use checkers_lobby::infrastructure::network::discovery::{
    start_probe_responder, ProbeIdentity, ProbeResponderConfig,
};
use checkers_lobby::infrastructure::network::multiplexer::Lobby;
use checkers_lobby::infrastructure::network::relay::ForwardingRelay;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Running(Arc<AtomicBool>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

async fn start_lobby() -> (SocketAddr, Running) {
    let lobby = Lobby::bind(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(ForwardingRelay::new()),
    )
    .await
    .unwrap();
    let addr = lobby.local_addr();
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(lobby.run(Arc::clone(&running)));
    (addr, Running(running))
}

async fn join(lobby: SocketAddr, nickname: &str, running: &Arc<AtomicBool>) -> ProtocolAgent {
    let config = AgentConfig::new(lobby, PlayerIdentity::new(nickname, "aW1n"));
    let (agent, _handle) = ProtocolAgent::connect(config, Arc::clone(running))
        .await
        .unwrap();
    agent
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_players_meet_and_play_through_the_lobby() {
    // Arrange
    let (lobby, _lobby_running) = start_lobby().await;
    let running = Arc::new(AtomicBool::new(true));
    let _agents_running = Running(Arc::clone(&running));

    let alice = join(lobby, "YWxpY2U=", &running).await;
    let bob = join(lobby, "Ym9i", &running).await;
    let alice_code = timeout(WAIT, alice.invite_code()).await.unwrap().unwrap();
    let bob_code = timeout(WAIT, bob.invite_code()).await.unwrap().unwrap();
    assert_ne!(alice_code, bob_code);

    let players = alice.get_active_players().await.unwrap().wait().await.unwrap();
    assert_eq!(players.len(), 2);

    // Act: Alice invites Bob, Bob accepts.
    let reply = alice.invite(&bob_code).await.unwrap();
    let proposal = timeout(WAIT, bob.proposals().next()).await.unwrap().unwrap();
    assert_eq!(proposal.from_nickname, "YWxpY2U=");
    assert_eq!(proposal.code, alice_code);
    bob.accept_invitation(&proposal.code).await.unwrap();
    let accepted = timeout(WAIT, reply.wait()).await.unwrap().unwrap();

    // Assert: the match relay carries chat and moves both ways.
    assert!(accepted);

    alice.chat_send_msg("good luck").await.unwrap();
    assert_eq!(
        timeout(WAIT, bob.chats().next()).await.unwrap().as_deref(),
        Some("good luck")
    );

    let opening: Move = "5,0>4,1".parse().unwrap();
    bob.send_move(&opening).await.unwrap();
    assert_eq!(
        timeout(WAIT, alice.moves().next()).await.unwrap(),
        Some(opening)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejected_invitation_keeps_both_players_in_the_lobby() {
    // Arrange
    let (lobby, _lobby_running) = start_lobby().await;
    let running = Arc::new(AtomicBool::new(true));
    let _agents_running = Running(Arc::clone(&running));
    let alice = join(lobby, "YWxpY2U=", &running).await;
    let bob = join(lobby, "Ym9i", &running).await;
    timeout(WAIT, alice.invite_code()).await.unwrap().unwrap();
    let bob_code = timeout(WAIT, bob.invite_code()).await.unwrap().unwrap();

    // Act
    let reply = alice.invite(&bob_code).await.unwrap();
    let proposal = timeout(WAIT, bob.proposals().next()).await.unwrap().unwrap();
    bob.reject_invitation(&proposal.code).await.unwrap();

    // Assert
    assert!(!timeout(WAIT, reply.wait()).await.unwrap().unwrap());
    let players = bob.get_active_players().await.unwrap().wait().await.unwrap();
    assert_eq!(players.len(), 2);
}

#[tokio::test]
async fn test_probe_finds_lobby_responder() {
    // Arrange
    let probe = LanProbe::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let _stop = Running(Arc::clone(&running));
    let responder = start_probe_responder(
        ProbeResponderConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            reply_to: Some(probe.local_addr().unwrap()),
        },
        Arc::new(RwLock::new(ProbeIdentity::new("bG9iYnk=", "aW1n").unwrap())),
        Arc::clone(&running),
    )
    .unwrap();

    // Act
    let peers = probe
        .probe(responder.local_addr, Duration::from_millis(700))
        .await
        .unwrap();

    // Assert
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].addr, responder.local_addr);
    assert_eq!(peers[0].identity, PlayerIdentity::new("bG9iYnk=", "aW1n"));
}

#[tokio::test]
async fn test_client_shares_the_discovery_port_with_a_lobby() {
    // Arrange: a responder holding the discovery port on this host.
    let running = Arc::new(AtomicBool::new(true));
    let _stop = Running(Arc::clone(&running));
    let responder = start_probe_responder(
        ProbeResponderConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            reply_to: Some("127.0.0.1:9".parse().unwrap()),
        },
        Arc::new(RwLock::new(ProbeIdentity::new("bG9iYnk=", "aW1n").unwrap())),
        Arc::clone(&running),
    )
    .unwrap();

    // Act
    let client = LanProbe::bind(responder.local_addr).await;

    // Assert
    let client = client.expect("the discovery port is shared");
    assert_eq!(client.local_addr().unwrap(), responder.local_addr);
}
