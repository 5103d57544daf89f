//! Server-wide broadcast bus.
//!
//! Game events that every connection must relay (block changes, entity
//! movement, chat) are published here as canonical packets. Each
//! connection subscribes and translates for its own dialect on the way
//! out. `source` names the player a broadcast originated from so their
//! own connection can skip it; `None` means deliver to everyone.

use tokio::sync::broadcast;

use strata_proto::Packet;

use crate::players::PlayerId;

/// Lagging subscribers drop oldest events past this depth.
pub const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Broadcast {
    pub source: Option<PlayerId>,
    pub packet: Packet,
}

pub struct EventBus {
    sender: broadcast::Sender<Broadcast>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publish an event. A send error only means nobody is online to
    /// hear it, which is fine.
    pub fn publish(&self, source: Option<PlayerId>, packet: Packet) {
        let _ = self.sender.send(Broadcast { source, packet });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
