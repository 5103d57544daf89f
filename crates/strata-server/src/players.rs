//! Online player registry.
//!
//! Each connection that completes login owns a [`PlayerHandle`]. The
//! registry hands out the lowest free entity id and enforces the two
//! join-time rules: no duplicate usernames (case-insensitive) and no
//! joins past the configured capacity.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use strata_proto::{Look, Packet, Position, ProtocolVersion, Uuid};

pub type PlayerId = i32;

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("a player named {0} is already online")]
    NameOnline(String),
    #[error("server is full")]
    Full,
}

/// Shared view of one connected player.
#[derive(Debug)]
pub struct PlayerHandle {
    pub id: PlayerId,
    pub username: String,
    pub uuid: Uuid,
    pub version: ProtocolVersion,
    sender: mpsc::Sender<Packet>,
    position: Mutex<(Position, Look)>,
}

impl PlayerHandle {
    pub fn position(&self) -> (Position, Look) {
        *self.position.lock().unwrap()
    }

    pub fn set_position(&self, pos: Position, look: Look) {
        *self.position.lock().unwrap() = (pos, look);
    }

    /// Queue a canonical packet for this player's connection. Returns
    /// false when the connection has already gone away.
    pub async fn send(&self, packet: Packet) -> bool {
        self.sender.send(packet).await.is_ok()
    }
}

pub struct PlayerRegistry {
    players: DashMap<PlayerId, Arc<PlayerHandle>>,
    /// Serializes id allocation so two concurrent logins cannot pick
    /// the same id or both squeeze past the capacity check.
    alloc: Mutex<()>,
    max_players: u32,
}

impl PlayerRegistry {
    pub fn new(max_players: u32) -> Self {
        Self {
            players: DashMap::new(),
            alloc: Mutex::new(()),
            max_players,
        }
    }

    pub fn register(
        &self,
        username: &str,
        version: ProtocolVersion,
        sender: mpsc::Sender<Packet>,
        pos: Position,
        look: Look,
    ) -> Result<Arc<PlayerHandle>, JoinError> {
        let _guard = self.alloc.lock().unwrap();
        if self.players.len() as u32 >= self.max_players {
            return Err(JoinError::Full);
        }
        if self
            .players
            .iter()
            .any(|p| p.username.eq_ignore_ascii_case(username))
        {
            return Err(JoinError::NameOnline(username.to_owned()));
        }
        let mut id: PlayerId = 0;
        while self.players.contains_key(&id) {
            id += 1;
        }
        let handle = Arc::new(PlayerHandle {
            id,
            username: username.to_owned(),
            uuid: Uuid::from_bytes(strata_crypto::offline_uuid(username)),
            version,
            sender,
            position: Mutex::new((pos, look)),
        });
        self.players.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn remove(&self, id: PlayerId) -> Option<Arc<PlayerHandle>> {
        self.players.remove(&id).map(|(_, h)| h)
    }

    pub fn get(&self, id: PlayerId) -> Option<Arc<PlayerHandle>> {
        self.players.get(&id).map(|h| Arc::clone(&h))
    }

    pub fn by_name(&self, username: &str) -> Option<Arc<PlayerHandle>> {
        self.players
            .iter()
            .find(|p| p.username.eq_ignore_ascii_case(username))
            .map(|p| Arc::clone(&p))
    }

    pub fn all(&self) -> Vec<Arc<PlayerHandle>> {
        self.players.iter().map(|p| Arc::clone(&p)).collect()
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }
}
