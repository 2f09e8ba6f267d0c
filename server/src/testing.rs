//! Engine fixture for unit tests: in-memory collaborators and fake connections.

use crate::client_manager::ClientId;
use crate::config::RaceConfig;
use crate::engine::RaceEngine;
use crate::memory::{FuelScoreProvider, MemoryTrackStore, StoreSettings, UserDirectory, UserRecord};
use crate::store::{Collaborators, Identity};
use shared::{Namespace, ServerEvent, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Harness {
    pub engine: Arc<RaceEngine>,
    pub store: Arc<MemoryTrackStore>,
}

pub struct TestClient {
    pub id: ClientId,
    pub identity: Identity,
    rx: mpsc::UnboundedReceiver<String>,
}

impl TestClient {
    /// Everything delivered so far.
    pub fn events(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            events.push(ServerEvent::from_json(&frame).expect("server sent invalid frame"));
        }
        events
    }

    pub fn names(&mut self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name()).collect()
    }

    /// Waits for the next event with the given wire name, discarding others.
    pub async fn wait_for(&mut self, name: &str, timeout: Duration) -> Option<ServerEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.rx.recv())
                .await
                .ok()??;
            let event = ServerEvent::from_json(&frame).expect("server sent invalid frame");
            if event.name() == name {
                return Some(event);
            }
        }
    }
}

pub fn test_config() -> RaceConfig {
    RaceConfig {
        race_size: 2,
        race_duration: Duration::from_millis(300),
        tick_interval: Duration::from_millis(25),
        min_awaiting: 2,
        list_limit: 50,
        prize: 100,
        race_name: "test-race".to_string(),
        max_clients: 64,
    }
}

fn users() -> UserDirectory {
    UserDirectory::new(
        ["alice", "bob", "carol", "dave"]
            .iter()
            .map(|id| UserRecord {
                token: format!("token-{}", id),
                id: id.to_string(),
                email: format!("{}@example.com", id),
                name: format!("{}{}", id[..1].to_uppercase(), &id[1..]),
                picture: None,
            })
            .collect(),
    )
}

impl Harness {
    pub fn new(config: RaceConfig) -> Self {
        let store = Arc::new(MemoryTrackStore::new(StoreSettings::from(&config)));
        let directory = Arc::new(users());
        let collaborators = Collaborators {
            tracks: store.clone(),
            scores: Arc::new(FuelScoreProvider::new(store.clone())),
            auth: directory.clone(),
            identities: directory,
        };
        Self {
            engine: Arc::new(RaceEngine::new(config, collaborators)),
            store,
        }
    }

    pub async fn connect(&self, user: &str, namespace: Namespace) -> TestClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = Identity {
            id: user.to_string(),
            email: format!("{}@example.com", user),
        };
        let id = self
            .engine
            .connect(
                identity.clone(),
                namespace,
                "127.0.0.1:9000".parse().unwrap(),
                tx,
            )
            .await
            .expect("server full");
        TestClient { id, identity, rx }
    }

    pub async fn track(&self, id: &str) -> Track {
        use crate::store::TrackStore;
        self.store
            .get_by_id(id)
            .await
            .unwrap()
            .expect("track missing")
    }

    pub async fn new_track(&self) -> Track {
        use crate::store::TrackStore;
        self.store.create().await.unwrap()
    }
}
