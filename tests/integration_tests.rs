//! Integration tests for the race coordinator
//!
//! These tests run a real listener and talk to it over WebSocket.

use assert_approx_eq::assert_approx_eq;
use futures::{SinkExt, StreamExt};
use server::config::RaceConfig;
use server::engine::RaceEngine;
use server::memory::{FuelScoreProvider, MemoryTrackStore, StoreSettings, UserDirectory, UserRecord};
use server::network::Server;
use server::store::Collaborators;
use shared::{
    ChatPost, ClientEvent, JoinRequest, ServerEvent, Track, TrackRef, TrackStatus,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Unknown namespaces are refused before the upgrade
    #[tokio::test]
    async fn unknown_namespace_is_not_found() {
        let (addr, _engine) = start_server(quick_config()).await;

        let result = connect_async(format!("ws://{}/lobby?token=token-alice", addr)).await;
        match result {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 404),
            other => panic!("Expected HTTP 404, got {:?}", other.map(|_| ())),
        }
    }

    /// A missing token never reaches the auth verifier
    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (addr, _engine) = start_server(quick_config()).await;

        let result = connect_async(format!("ws://{}/race", addr)).await;
        match result {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("Expected HTTP 401, got {:?}", other.map(|_| ())),
        }
    }

    /// A token the verifier rejects closes the socket with a policy error
    #[tokio::test]
    async fn invalid_token_is_closed() {
        let (addr, engine) = start_server(quick_config()).await;

        let (mut ws, _) = connect_async(format!("ws://{}/race?token=forged", addr))
            .await
            .expect("upgrade should succeed");

        let message = timeout(WAIT, ws.next())
            .await
            .expect("no close frame")
            .expect("stream ended")
            .expect("read failed");
        match message {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Policy);
                assert!(frame.reason.contains("Authentication failed"));
            }
            other => panic!("Expected close frame, got {:?}", other),
        }
        assert_eq!(engine.rooms().client_count().await, 0);
    }

    /// Garbage frames are answered with an error on the same connection
    #[tokio::test]
    async fn malformed_frame_gets_error() {
        let (addr, _engine) = start_server(quick_config()).await;
        let mut alice = WsClient::connect(addr, "race", "alice").await;

        alice.send_raw("this is not json").await;

        match alice.next_event().await {
            ServerEvent::Error(err) => assert!(!err.message.is_empty()),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    /// Chat events are only accepted on the chat namespace
    #[tokio::test]
    async fn chat_event_on_race_namespace_is_rejected() {
        let (addr, _engine) = start_server(quick_config()).await;
        let mut alice = WsClient::connect(addr, "race", "alice").await;

        alice
            .send(&ClientEvent::JoinChat(TrackRef {
                track_id: "t1".to_string(),
            }))
            .await;

        assert_eq!(
            alice.next_event().await,
            ServerEvent::error("Event not supported on this namespace")
        );
    }
}

/// RACE LIFECYCLE TESTS
mod race_tests {
    use super::*;

    /// Two players fill a track, race, and receive one settlement each
    #[tokio::test]
    async fn full_race_over_websocket() {
        let (addr, engine) = start_server(quick_config()).await;
        let mut lobby = WsClient::connect(addr, "tracks", "dave").await;
        let mut alice = WsClient::connect(addr, "race", "alice").await;
        let mut bob = WsClient::connect(addr, "race", "bob").await;

        let track = lobby.first_awaiting_track().await;

        alice.join(&track.id).await;
        match alice.wait_for("joinedTrack").await {
            ServerEvent::JoinedTrack(joined) => {
                assert_eq!(joined.track_id, track.id);
                assert_eq!(joined.player.id, "alice");
                assert_eq!(joined.player.position, 0);
                assert_approx_eq!(joined.player.fuel_total(), 100.0, 1e-9);
            }
            other => panic!("Unexpected {:?}", other),
        }

        // lobby sees the seat taken
        match lobby.wait_for("initTracks").await {
            ServerEvent::InitTracks(list) => {
                let listed = list.tracks.iter().find(|t| t.id == track.id).unwrap();
                assert_eq!(listed.players.len(), 1);
            }
            other => panic!("Unexpected {:?}", other),
        }

        bob.join(&track.id).await;
        for client in [&mut alice, &mut bob] {
            match client.wait_for("start").await {
                ServerEvent::Start(start) => {
                    assert_eq!(start.id, track.id);
                    assert_eq!(start.end - start.start, 400);
                    assert_eq!(start.players.len(), 2);
                }
                other => panic!("Unexpected {:?}", other),
            }
        }

        for client in [&mut alice, &mut bob] {
            match client.wait_for("gameover").await {
                ServerEvent::Gameover(results) => {
                    assert_eq!(results.len(), 2);
                    assert_eq!(results[0].prize, 100);
                    assert_eq!(results[1].prize, 0);
                    assert!(results[0].score >= results[1].score);
                }
                other => panic!("Unexpected {:?}", other),
            }
        }

        assert!(alice.quiet_for(Duration::from_millis(200)).await);
        assert!(!engine.clocks().is_running(&track.id).await);
    }

    /// A third player cannot join a full track and the room never hears of it
    #[tokio::test]
    async fn late_joiner_is_rejected_then_loads() {
        let mut config = quick_config();
        config.race_duration = Duration::from_secs(30);
        let (addr, engine) = start_server(config).await;
        let mut lobby = WsClient::connect(addr, "tracks", "dave").await;
        let mut alice = WsClient::connect(addr, "race", "alice").await;
        let mut bob = WsClient::connect(addr, "race", "bob").await;
        let mut carol = WsClient::connect(addr, "race", "carol").await;

        let track = lobby.first_awaiting_track().await;
        alice.join(&track.id).await;
        alice.wait_for("joinedTrack").await;
        bob.join(&track.id).await;
        bob.wait_for("start").await;

        carol.join(&track.id).await;
        assert_eq!(
            carol.next_event().await,
            ServerEvent::error("Track is already active")
        );

        carol
            .send(&ClientEvent::LoadTrack(TrackRef {
                track_id: track.id.clone(),
            }))
            .await;
        match carol.wait_for("start").await {
            ServerEvent::Start(start) => assert_eq!(start.players.len(), 2),
            other => panic!("Unexpected {:?}", other),
        }
        assert_eq!(engine.clocks().len().await, 1);
        engine.shutdown().await;
    }

    /// Disconnecting mid-race leaves the track alone
    #[tokio::test]
    async fn disconnect_keeps_seat() {
        let (addr, engine) = start_server(quick_config()).await;
        let mut lobby = WsClient::connect(addr, "tracks", "dave").await;
        let mut alice = WsClient::connect(addr, "race", "alice").await;

        let track = lobby.first_awaiting_track().await;
        alice.join(&track.id).await;
        alice.wait_for("joinedTrack").await;
        alice.close().await;

        lobby
            .send(&ClientEvent::GetTracks)
            .await;
        match lobby.wait_for("initTracks").await {
            ServerEvent::InitTracks(list) => {
                let listed = list.tracks.iter().find(|t| t.id == track.id).unwrap();
                assert_eq!(listed.status, TrackStatus::Awaiting);
                assert_eq!(listed.players.len(), 1);
            }
            other => panic!("Unexpected {:?}", other),
        }

        let deadline = tokio::time::Instant::now() + WAIT;
        while engine.rooms().client_count().await > 1 {
            assert!(tokio::time::Instant::now() < deadline, "client never released");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// CHAT TESTS
mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn chat_log_is_shared() {
        let (addr, _engine) = start_server(quick_config()).await;
        let mut alice = WsClient::connect(addr, "chat", "alice").await;
        let mut bob = WsClient::connect(addr, "chat", "bob").await;
        let room = TrackRef {
            track_id: "t1".to_string(),
        };

        alice.send(&ClientEvent::JoinChat(room.clone())).await;
        assert_eq!(alice.next_event().await, ServerEvent::JoinedChat(vec![]));
        bob.send(&ClientEvent::JoinChat(room)).await;
        bob.wait_for("joinedChat").await;

        bob.send(&ClientEvent::Message(ChatPost {
            chat_id: "t1".to_string(),
            message: "see you at the finish".to_string(),
        }))
        .await;

        match alice.wait_for("updateChat").await {
            ServerEvent::UpdateChat(log) => {
                assert_eq!(log.len(), 1);
                assert_eq!(log[0].author, "Bob");
                assert_eq!(log[0].user_id, "bob");
                assert_eq!(log[0].message, "see you at the finish");
            }
            other => panic!("Unexpected {:?}", other),
        }
    }
}

// HELPER FUNCTIONS

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsClient {
    ws: Socket,
}

impl WsClient {
    async fn connect(addr: SocketAddr, namespace: &str, user: &str) -> Self {
        let url = format!("ws://{}/{}?token=token-{}", addr, namespace, user);
        let (ws, _) = connect_async(url).await.expect("Failed to connect");
        WsClient { ws }
    }

    async fn send(&mut self, event: &ClientEvent) {
        self.send_raw(&event.to_json().unwrap()).await;
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("Failed to send");
    }

    async fn join(&mut self, track_id: &str) {
        self.send(&ClientEvent::JoinTrack(JoinRequest {
            track_id: track_id.to_string(),
            fuel: vec![],
        }))
        .await;
    }

    async fn next_event(&mut self) -> ServerEvent {
        loop {
            let message = timeout(WAIT, self.ws.next())
                .await
                .expect("Timed out waiting for event")
                .expect("Stream ended")
                .expect("Read failed");
            if let Message::Text(text) = message {
                return ServerEvent::from_json(&text).expect("Invalid server frame");
            }
        }
    }

    async fn wait_for(&mut self, name: &str) -> ServerEvent {
        loop {
            let event = self.next_event().await;
            if event.name() == name {
                return event;
            }
        }
    }

    /// True when no text frame arrives within `period`.
    async fn quiet_for(&mut self, period: Duration) -> bool {
        loop {
            match timeout(period, self.ws.next()).await {
                Err(_) => return true,
                Ok(Some(Ok(Message::Text(_)))) => return false,
                Ok(Some(Ok(_))) => continue,
                Ok(_) => return true,
            }
        }
    }

    async fn first_awaiting_track(&mut self) -> Track {
        self.send(&ClientEvent::GetTracks).await;
        match self.wait_for("initTracks").await {
            ServerEvent::InitTracks(list) => list
                .tracks
                .into_iter()
                .find(|t| t.status == TrackStatus::Awaiting)
                .expect("No awaiting track listed"),
            other => panic!("Unexpected {:?}", other),
        }
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

fn quick_config() -> RaceConfig {
    RaceConfig {
        race_size: 2,
        race_duration: Duration::from_millis(400),
        tick_interval: Duration::from_millis(50),
        min_awaiting: 2,
        list_limit: 50,
        prize: 100,
        race_name: "integration".to_string(),
        max_clients: 32,
    }
}

fn users() -> UserDirectory {
    UserDirectory::new(
        [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol"), ("dave", "Dave")]
            .iter()
            .map(|(id, name)| UserRecord {
                token: format!("token-{}", id),
                id: id.to_string(),
                email: format!("{}@example.com", id),
                name: name.to_string(),
                picture: None,
            })
            .collect(),
    )
}

async fn start_server(config: RaceConfig) -> (SocketAddr, Arc<RaceEngine>) {
    let tracks = Arc::new(MemoryTrackStore::new(StoreSettings::from(&config)));
    let directory = Arc::new(users());
    let collaborators = Collaborators {
        tracks: tracks.clone(),
        scores: Arc::new(FuelScoreProvider::new(tracks)),
        auth: directory.clone(),
        identities: directory,
    };
    let engine = Arc::new(RaceEngine::new(config, collaborators));

    let server = Server::bind("127.0.0.1:0", Arc::clone(&engine))
        .await
        .expect("Failed to bind");
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, engine)
}
