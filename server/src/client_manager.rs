//! Connected client roster for the UDP host
//!
//! This module keeps the server-side view of every connected player:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Last reported pose, used to place lights and effects
//! - Inventory contents, the item in hand and the blade flag on that item
//! - Capacity limits and address lookup for packet routing
//!
//! The extension never sees this type directly. It reaches it through the
//! collaborator traits implemented by the network host.

use crate::host::PlayerPose;
use log::info;
use shared::{PlayerId, Vec3};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Clients silent for longer than this are dropped
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("unknown client {0}")]
    UnknownClient(PlayerId),
    #[error("{0} does not own {1}")]
    NotOwned(PlayerId, String),
}

/// Represents a connected client and what the server knows about their avatar
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Last reported position and look direction
    pub pose: PlayerPose,
    /// Item ids in the client's inventory
    pub items: Vec<String>,
    /// Item currently in the main hand
    pub held_item: Option<String>,
    /// Mirror of the active flag stored on the held weapon
    pub blade_active: bool,
}

impl Client {
    /// Creates a new client standing at the origin with empty hands
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            pose: PlayerPose::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)),
            items: Vec::new(),
            held_item: None,
            blade_active: false,
        }
    }

    /// Marks the client as recently active
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The ClientManager provides centralized control over client connections,
/// enforces server capacity limits and answers the directory and inventory
/// queries the extension makes about players.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<PlayerId, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = PlayerId(self.next_client_id);
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone. Extension cleanup is the caller's job.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Looks up the client behind `addr` and refreshes its activity timestamp
    pub fn touch_by_addr(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        let client = self.clients.values_mut().find(|client| client.addr == addr)?;
        client.touch();
        Some(client.id)
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn addr_of(&self, client_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    pub fn pose(&self, client_id: PlayerId) -> Option<PlayerPose> {
        self.clients.get(&client_id).map(|client| client.pose)
    }

    pub fn set_pose(&mut self, client_id: PlayerId, pose: PlayerPose) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.pose = pose;
                true
            }
            None => false,
        }
    }

    pub fn held_item(&self, client_id: PlayerId) -> Option<String> {
        self.clients
            .get(&client_id)
            .and_then(|client| client.held_item.clone())
    }

    /// Puts `item` in the client's hand and returns what was there before.
    ///
    /// Items the client does not own are refused and the hand is left as is.
    pub fn set_held_item(
        &mut self,
        client_id: PlayerId,
        item: Option<String>,
    ) -> Result<Option<String>, ClientError> {
        let client = self
            .clients
            .get_mut(&client_id)
            .ok_or(ClientError::UnknownClient(client_id))?;
        if let Some(id) = &item {
            if !client.items.contains(id) {
                return Err(ClientError::NotOwned(client_id, id.clone()));
            }
        }
        client.blade_active = false;
        Ok(std::mem::replace(&mut client.held_item, item))
    }

    /// Adds an item to the inventory. An empty hand picks it up.
    pub fn give_item(&mut self, client_id: PlayerId, item_id: &str) -> bool {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        client.items.push(item_id.to_string());
        if client.held_item.is_none() {
            client.held_item = Some(item_id.to_string());
        }
        true
    }

    pub fn set_blade_flag(&mut self, client_id: PlayerId, active: bool) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) if client.held_item.is_some() => {
                client.blade_active = active;
                true
            }
            _ => false,
        }
    }

    /// Checks for and removes timed-out clients
    ///
    /// Returns the removed client IDs so the caller can run the extension's
    /// disconnect path for each of them.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all client IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
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

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(PlayerId(1), addr);

        assert_eq!(client.id, PlayerId(1));
        assert_eq!(client.addr, addr);
        assert!(client.items.is_empty());
        assert!(client.held_item.is_none());
        assert!(!client.blade_active);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(PlayerId(1), test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        client.touch();
        assert!(!client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        let client_id1 = manager.add_client(test_addr());
        assert_eq!(client_id1, Some(PlayerId(1)));

        let client_id2 = manager.add_client(test_addr2());
        assert!(client_id2.is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(manager.is_empty());
        assert!(!manager.remove_client(&client_id));
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let _client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
        assert_eq!(manager.touch_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_pose_updates() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(test_addr()).unwrap();

        let pose = PlayerPose::new(Vec3::new(4.0, 70.0, -2.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(manager.set_pose(id, pose));
        assert_eq!(manager.pose(id), Some(pose));
        assert!(!manager.set_pose(PlayerId(42), pose));
    }

    #[test]
    fn test_give_and_hold_items() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(test_addr()).unwrap();

        assert!(manager.give_item(id, "lightsaber_mod:lightsaber_blue"));
        assert!(manager.give_item(id, "lightsaber_mod:lightsaber_red"));
        assert_eq!(
            manager.held_item(id).as_deref(),
            Some("lightsaber_mod:lightsaber_blue")
        );

        let previous = manager
            .set_held_item(id, Some("lightsaber_mod:lightsaber_red".to_string()))
            .unwrap();
        assert_eq!(previous.as_deref(), Some("lightsaber_mod:lightsaber_blue"));

        assert!(manager
            .set_held_item(id, Some("hytale:iron_sword".to_string()))
            .is_err());
        assert_eq!(
            manager.held_item(id).as_deref(),
            Some("lightsaber_mod:lightsaber_red")
        );
    }

    #[test]
    fn test_blade_flag_needs_item_in_hand() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(test_addr()).unwrap();

        assert!(!manager.set_blade_flag(id, true));
        manager.give_item(id, "lightsaber_mod:lightsaber_green");
        assert!(manager.set_blade_flag(id, true));
        assert!(manager.get(id).unwrap().blade_active);

        manager.set_held_item(id, None).unwrap();
        assert!(!manager.get(id).unwrap().blade_active);
    }

    #[test]
    fn test_check_timeouts() {
        let mut manager = ClientManager::new(3);
        let stale = manager.add_client(test_addr()).unwrap();
        let fresh = manager.add_client(test_addr2()).unwrap();

        manager.clients.get_mut(&stale).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        let timed_out = manager.check_timeouts(CLIENT_TIMEOUT);
        assert_eq!(timed_out, vec![stale]);
        assert!(manager.get(fresh).is_some());
        assert_eq!(manager.len(), 1);
    }
}
