//! Relay integration tests.
//!
//! Runs a relay on an ephemeral port and plays through it with real
//! channels and sessions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tictactoe::config::{ClientConfig, RelayConfig};
use tictactoe::game::{Outcome, Role, TurnState};
use tictactoe::network::{
    ChannelEvent, ChannelHandle, GameSession, JoinRequest, PeerMessage, ProtocolViolation,
    RelayServer, RoomToken, SessionChannel, SessionEvent, SessionPhase, Status,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper to start a relay on an ephemeral port
async fn start_relay() -> (Arc<RelayServer>, ClientConfig) {
    let config = RelayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let server = Arc::new(RelayServer::bind(config).await.unwrap());
    let url = format!("ws://{}/ws", server.local_addr().unwrap());

    let runner = server.clone();
    tokio::spawn(async move { runner.run().await });

    let client = ClientConfig::default().with_relay_url(url).unwrap();
    (server, client)
}

struct Player {
    channel: SessionChannel,
    session: GameSession<ChannelHandle>,
}

impl Player {
    fn connect(config: &ClientConfig, room: &str, role: Role) -> Self {
        let request = JoinRequest {
            room: RoomToken::new(room).unwrap(),
            joining: role.is_joiner(),
        };
        let channel = SessionChannel::connect(config, request);
        let session = GameSession::new(role, channel.handle());
        Self { channel, session }
    }

    /// Feed channel events until `done` holds.
    async fn wait_until(&mut self, done: impl Fn(&GameSession<ChannelHandle>) -> bool) {
        while !done(&self.session) {
            let event = tokio::time::timeout(STEP_TIMEOUT, self.channel.next_event())
                .await
                .expect("timed out waiting for channel event")
                .expect("channel ended");
            self.session.handle(SessionEvent::Channel(event));
        }
    }

    async fn wait_for_marks(&mut self, count: usize) {
        self.wait_until(|s| s.board().marked_count() == count).await;
    }
}

/// Creator and joiner connected, joiner's ready seen by the creator.
async fn paired(config: &ClientConfig, room: &str) -> (Player, Player) {
    let mut first = Player::connect(config, room, Role::First);
    first.wait_until(|s| *s.phase() == SessionPhase::Connected).await;

    let mut second = Player::connect(config, room, Role::Second);
    second.wait_until(|s| *s.phase() == SessionPhase::Connected).await;

    first.wait_until(|s| s.opponent_present()).await;
    (first, second)
}

#[tokio::test]
async fn test_full_round_through_relay() {
    let (server, config) = start_relay().await;
    let (mut first, mut second) = paired(&config, "1234").await;

    assert_eq!(first.session.turn(), TurnState::MyTurn);
    assert_eq!(second.session.turn(), TurnState::OpponentTurn);
    assert_eq!(second.session.status(), Status::Connected);

    // X: 0, 1, 2 / O: 4, 5
    let moves = [(Role::First, 0), (Role::Second, 4), (Role::First, 1), (Role::Second, 5), (Role::First, 2)];
    for (played, (role, index)) in moves.into_iter().enumerate() {
        let (mover, watcher) = match role {
            Role::First => (&mut first, &mut second),
            Role::Second => (&mut second, &mut first),
        };
        assert!(mover.session.local_move(index), "move {} rejected", index);
        watcher.wait_for_marks(played + 1).await;
    }

    for player in [&first, &second] {
        assert_eq!(player.session.outcome(), Outcome::Won(Role::First));
        assert_eq!(player.session.status(), Status::Winner(Role::First));
        assert_eq!(player.session.status().to_string(), "Winner: X");
        assert_eq!(player.session.board().winning_line(), Some([0, 1, 2]));
        assert!(player.session.can_restart());
    }
    assert_eq!(first.session.board(), second.session.board());

    // Loser restarts; both boards clear and turns return to the role default.
    assert!(second.session.local_restart());
    first.wait_for_marks(0).await;
    assert_eq!(*first.session.phase(), SessionPhase::InProgress);
    assert_eq!(first.session.turn(), TurnState::MyTurn);
    assert_eq!(second.session.turn(), TurnState::OpponentTurn);
    assert_eq!(first.session.status(), Status::Connected);

    // Relay shutdown closes both sockets.
    server.shutdown();
    first.wait_until(|s| s.is_terminal()).await;
    second.wait_until(|s| s.is_terminal()).await;
    assert_eq!(first.session.status(), Status::Disconnected);
    assert_eq!(second.session.status().to_string(), "Disconnected from server");
}

#[tokio::test]
async fn test_out_of_turn_move_is_not_sent() {
    let (_server, config) = start_relay().await;
    let (mut first, mut second) = paired(&config, "turns").await;

    assert!(!second.session.local_move(0));
    assert!(first.session.local_move(4));
    second.wait_for_marks(1).await;

    // Occupied cell and second move in a row are both refused locally.
    assert!(!second.session.local_move(4));
    assert!(!first.session.local_move(0));
    assert!(second.session.local_move(0));
    first.wait_for_marks(2).await;
    assert_eq!(first.session.board(), second.session.board());
}

#[tokio::test]
async fn test_join_missing_room_errors() {
    let (_server, config) = start_relay().await;
    let mut joiner = Player::connect(&config, "nobody-here", Role::Second);

    joiner.wait_until(|s| s.is_terminal()).await;
    assert!(matches!(joiner.session.phase(), SessionPhase::Errored { .. }));
    assert_eq!(joiner.session.status(), Status::ConnectionError);
    assert_eq!(joiner.session.status().to_string(), "Error in connection");
}

#[tokio::test]
async fn test_third_peer_rejected() {
    let (server, config) = start_relay().await;
    let (_first, _second) = paired(&config, "full").await;

    let mut third = Player::connect(&config, "full", Role::Second);
    third.wait_until(|s| s.is_terminal()).await;
    assert_eq!(third.session.status(), Status::ConnectionError);

    let mut duplicate = Player::connect(&config, "full", Role::First);
    duplicate.wait_until(|s| s.is_terminal()).await;
    assert_eq!(duplicate.session.status(), Status::ConnectionError);

    let room = RoomToken::new("full").unwrap();
    assert_eq!(server.rooms().peer_count(&room), 2);
}

#[tokio::test]
async fn test_room_released_after_leave() {
    let (server, config) = start_relay().await;
    let (first, second) = paired(&config, "leave").await;
    let room = RoomToken::new("leave").unwrap();

    second.channel.close().await;
    tokio::time::timeout(STEP_TIMEOUT, async {
        while server.rooms().peer_count(&room) != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // The seat is free again for a new joiner.
    let mut replacement = Player::connect(&config, "leave", Role::Second);
    replacement.wait_until(|s| *s.phase() == SessionPhase::Connected).await;

    first.channel.close().await;
    replacement.channel.close().await;
    tokio::time::timeout(STEP_TIMEOUT, async {
        while server.rooms().room_count() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_relay_forwards_text_verbatim() {
    let (_server, config) = start_relay().await;

    let (mut raw, _) = connect_async(format!("{}?room=raw&join=0", config.relay_url))
        .await
        .unwrap();

    let mut joiner = Player::connect(&config, "raw", Role::Second);
    joiner.wait_until(|s| *s.phase() == SessionPhase::Connected).await;

    // Joiner's ready arrives exactly as serialized.
    let frame = tokio::time::timeout(STEP_TIMEOUT, raw.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame, Message::Text(PeerMessage::Ready.to_json().unwrap()));

    raw.send(Message::Text("not json".to_string())).await.unwrap();
    let event = tokio::time::timeout(STEP_TIMEOUT, joiner.channel.next_event())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, ChannelEvent::Malformed(ProtocolViolation::Malformed(_))));

    raw.send(Message::Text(r#"{"type":"makeMove","index":0}"#.to_string())).await.unwrap();
    joiner.wait_for_marks(1).await;
    assert_eq!(joiner.session.turn(), TurnState::MyTurn);
}
