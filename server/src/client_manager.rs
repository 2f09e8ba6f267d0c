//! Registry of authenticated socket connections
//!
//! This module tracks every live connection after it passed the connection gate:
//! - Connection ID assignment and capacity enforcement
//! - The verified identity and namespace of each connection
//! - The outbound queue used to deliver serialized events
//!
//! A connection is removed exactly once, when its socket closes. Room membership
//! is layered on top of this registry and never outlives it.

use crate::store::Identity;
use log::info;
use shared::Namespace;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

pub type ClientId = u32;

/// Outbound queue of JSON text frames for one connection
pub type Outbox = mpsc::UnboundedSender<String>;

/// Represents an authenticated connection
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: ClientId,
    pub identity: Identity,
    pub namespace: Namespace,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    outbox: Outbox,
}

impl Client {
    pub fn new(
        id: ClientId,
        identity: Identity,
        namespace: Namespace,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Self {
        Self {
            id,
            identity,
            namespace,
            addr,
            connected_at: Instant::now(),
            outbox,
        }
    }

    /// Queues a frame for delivery
    ///
    /// Returns false if the connection's writer has already gone away.
    pub fn send(&self, frame: &str) -> bool {
        self.outbox.send(frame.to_string()).is_ok()
    }
}

/// Manages all authenticated connections
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Connection IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at capacity.
    pub fn add_client(
        &mut self,
        identity: Identity,
        namespace: Namespace,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!(
            "Client {} ({}) connected to {} from {}",
            client_id,
            identity.id,
            namespace.path(),
            addr
        );
        let client = Client::new(client_id, identity, namespace, addr, outbox);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a connection, dropping its outbound queue
    pub fn remove_client(&mut self, client_id: &ClientId) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!(
            "Client {} ({}) disconnected after {:?}",
            client.id,
            client.identity.id,
            client.connected_at.elapsed()
        );
        Some(client)
    }

    pub fn get(&self, client_id: &ClientId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Queues a frame for one connection. Returns false for unknown or closed ones.
    pub fn send_to(&self, client_id: &ClientId, frame: &str) -> bool {
        self.clients
            .get(client_id)
            .map(|client| client.send(frame))
            .unwrap_or(false)
    }

    /// IDs of every connection opened on the given namespace
    pub fn ids_in_namespace(&self, namespace: Namespace) -> Vec<ClientId> {
        self.clients
            .values()
            .filter(|client| client.namespace == namespace)
            .map(|client| client.id)
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: format!("{}@example.com", id),
        }
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);
        let (tx, _rx) = mpsc::unbounded_channel();

        let id1 = manager
            .add_client(identity("a"), Namespace::Race, test_addr(), tx.clone())
            .unwrap();
        let id2 = manager
            .add_client(identity("b"), Namespace::Chat, test_addr(), tx)
            .unwrap();

        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.get(&id2).map(|c| c.namespace), Some(Namespace::Chat));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(manager
            .add_client(identity("a"), Namespace::Race, test_addr(), tx.clone())
            .is_some());
        assert!(manager
            .add_client(identity("b"), Namespace::Race, test_addr(), tx)
            .is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let (tx, _rx) = mpsc::unbounded_channel();

        let client_id = manager
            .add_client(identity("a"), Namespace::Tracks, test_addr(), tx)
            .unwrap();
        let removed = manager.remove_client(&client_id);
        assert_eq!(removed.map(|c| c.identity.id), Some("a".to_string()));
        assert!(manager.is_empty());
        assert!(manager.remove_client(&client_id).is_none());
    }

    #[test]
    fn test_send_to_client() {
        let mut manager = ClientManager::new(2);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let client_id = manager
            .add_client(identity("a"), Namespace::Race, test_addr(), tx)
            .unwrap();

        assert!(manager.send_to(&client_id, "hello"));
        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert!(!manager.send_to(&999, "hello"));

        drop(rx);
        assert!(!manager.send_to(&client_id, "gone"));
    }

    #[test]
    fn test_ids_in_namespace() {
        let mut manager = ClientManager::new(4);
        let (tx, _rx) = mpsc::unbounded_channel();

        let lobby = manager
            .add_client(identity("a"), Namespace::Tracks, test_addr(), tx.clone())
            .unwrap();
        manager
            .add_client(identity("b"), Namespace::Race, test_addr(), tx)
            .unwrap();

        assert_eq!(manager.ids_in_namespace(Namespace::Tracks), vec![lobby]);
        assert!(manager.ids_in_namespace(Namespace::Chat).is_empty());
    }
}
