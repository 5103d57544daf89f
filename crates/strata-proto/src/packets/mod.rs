//! Canonical packet set.
//!
//! Every packet the server understands, across all twenty dialects, as one
//! enum. The per-packet structs own their era-aware codecs; [`Packet`] adds
//! the uniform surface the registry and the connection plumbing work with.

pub mod block;
pub mod chat;
pub mod chunk_data;
pub mod classic;
pub mod entity;
pub mod handshake;
pub mod info;
pub mod inventory;
pub mod keep_alive;
pub mod legacy_login;
pub mod login;
pub mod movement;

pub use block::{BlockChange, BlockDig, BlockPlace, DigStatus};
pub use chat::Chat;
pub use chunk_data::{ChunkData, ChunkUnload, PreChunk};
pub use classic::{
    ClassicIdentReply, ClassicIdentRequest, ClassicLevelChunk, ClassicLevelFinalize,
    ClassicLevelInit, ClassicPing, ClassicSetBlock,
};
pub use entity::{DespawnPlayer, EntityTeleport, SpawnPlayer, SwingArm};
pub use handshake::{Handshake, StatusPing, StatusPong, StatusRequest, StatusResponse};
pub use info::{Disconnect, PlayerListItem, SpawnPosition, TimeUpdate};
pub use inventory::{CreativeSlot, HeldItemChange, SetSlot};
pub use keep_alive::KeepAlive;
pub use legacy_login::{
    LegacyHandshakeReply, LegacyHandshakeRequest, LegacyLoginReply, LegacyLoginRequest,
};
pub use login::{
    EncryptionRequest, EncryptionResponse, JoinGame, LoginDisconnect, LoginStart, LoginSuccess,
};
pub use movement::{PlayerLook, PlayerOnGround, PlayerPosition, PlayerPositionLook, PositionLook};

use bytes::BufMut;

use crate::error::ProtoError;
use crate::version::ProtocolVersion;

macro_rules! packets {
    ($($variant:ident),* $(,)?) => {
        /// One decoded packet, any dialect, any direction.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($variant),)*
        }

        /// Fieldless mirror of [`Packet`], the key for reverse id lookups.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PacketKind {
            $($variant,)*
        }

        impl Packet {
            pub fn kind(&self) -> PacketKind {
                match self {
                    $(Packet::$variant(_) => PacketKind::$variant,)*
                }
            }
        }

        $(
            impl From<$variant> for Packet {
                fn from(p: $variant) -> Packet {
                    Packet::$variant(p)
                }
            }
        )*
    };
}

packets! {
    // Framed handshake and status
    Handshake,
    StatusRequest,
    StatusResponse,
    StatusPing,
    StatusPong,
    // Framed login
    LoginStart,
    EncryptionRequest,
    EncryptionResponse,
    LoginSuccess,
    LoginDisconnect,
    JoinGame,
    // Legacy handshake and login
    LegacyHandshakeRequest,
    LegacyHandshakeReply,
    LegacyLoginRequest,
    LegacyLoginReply,
    // Classic session
    ClassicIdentRequest,
    ClassicIdentReply,
    ClassicLevelInit,
    ClassicLevelChunk,
    ClassicLevelFinalize,
    ClassicPing,
    ClassicSetBlock,
    // Shared play state
    KeepAlive,
    Chat,
    PlayerOnGround,
    PlayerPosition,
    PlayerLook,
    PlayerPositionLook,
    PositionLook,
    BlockDig,
    BlockPlace,
    BlockChange,
    ChunkData,
    PreChunk,
    ChunkUnload,
    SpawnPlayer,
    DespawnPlayer,
    EntityTeleport,
    SwingArm,
    SetSlot,
    CreativeSlot,
    HeldItemChange,
    SpawnPosition,
    TimeUpdate,
    PlayerListItem,
    Disconnect,
}

impl Packet {
    /// Encode the packet body (no id, no frame) for one dialect.
    ///
    /// Direction-asymmetric packets ([`Chat`], [`SwingArm`]) encode their
    /// clientbound form here; serverbound encoding of those is only ever
    /// needed by tests, which call the struct codecs directly.
    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        match self {
            Packet::Handshake(p) => p.write(buf, version),
            Packet::StatusRequest(p) => p.write(buf, version),
            Packet::StatusResponse(p) => p.write(buf, version),
            Packet::StatusPing(p) => p.write(buf, version),
            Packet::StatusPong(p) => p.write(buf, version),
            Packet::LoginStart(p) => p.write(buf, version),
            Packet::EncryptionRequest(p) => p.write(buf, version),
            Packet::EncryptionResponse(p) => p.write(buf, version),
            Packet::LoginSuccess(p) => p.write(buf, version),
            Packet::LoginDisconnect(p) => p.write(buf, version),
            Packet::JoinGame(p) => p.write(buf, version),
            Packet::LegacyHandshakeRequest(p) => p.write(buf, version),
            Packet::LegacyHandshakeReply(p) => p.write(buf, version),
            Packet::LegacyLoginRequest(p) => p.write(buf, version),
            Packet::LegacyLoginReply(p) => p.write(buf, version),
            Packet::ClassicIdentRequest(p) => p.write(buf, version),
            Packet::ClassicIdentReply(p) => p.write(buf, version),
            Packet::ClassicLevelInit(p) => p.write(buf, version),
            Packet::ClassicLevelChunk(p) => p.write(buf, version),
            Packet::ClassicLevelFinalize(p) => p.write(buf, version),
            Packet::ClassicPing(p) => p.write(buf, version),
            Packet::ClassicSetBlock(p) => p.write(buf, version),
            Packet::KeepAlive(p) => p.write(buf, version),
            Packet::Chat(p) => {
                if version.is_framed() {
                    p.write_json(buf, version)
                } else {
                    p.write(buf, version)
                }
            }
            Packet::PlayerOnGround(p) => p.write(buf, version),
            Packet::PlayerPosition(p) => p.write(buf, version),
            Packet::PlayerLook(p) => p.write(buf, version),
            Packet::PlayerPositionLook(p) => p.write(buf, version),
            Packet::PositionLook(p) => p.write(buf, version),
            Packet::BlockDig(p) => p.write(buf, version),
            Packet::BlockPlace(p) => p.write(buf, version),
            Packet::BlockChange(p) => p.write(buf, version),
            Packet::ChunkData(p) => p.write(buf, version),
            Packet::PreChunk(p) => p.write(buf, version),
            Packet::ChunkUnload(p) => p.write(buf, version),
            Packet::SpawnPlayer(p) => p.write(buf, version),
            Packet::DespawnPlayer(p) => p.write(buf, version),
            Packet::EntityTeleport(p) => p.write(buf, version),
            Packet::SwingArm(p) => p.write(buf, version),
            Packet::SetSlot(p) => p.write(buf, version),
            Packet::CreativeSlot(p) => p.write(buf, version),
            Packet::HeldItemChange(p) => p.write(buf, version),
            Packet::SpawnPosition(p) => p.write(buf, version),
            Packet::TimeUpdate(p) => p.write(buf, version),
            Packet::PlayerListItem(p) => p.write(buf, version),
            Packet::Disconnect(p) => p.write(buf, version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn kind_tracks_variant() {
        let packet: Packet = KeepAlive { id: 7 }.into();
        assert_eq!(packet.kind(), PacketKind::KeepAlive);
        let packet: Packet = Disconnect {
            reason: "bye".into(),
        }
        .into();
        assert_eq!(packet.kind(), PacketKind::Disconnect);
    }

    #[test]
    fn framed_chat_writes_json_form() {
        let packet: Packet = Chat {
            message: "hi".into(),
        }
        .into();
        let mut buf = BytesMut::new();
        packet.write(&mut buf, ProtocolVersion::FRAMED_4).unwrap();
        let mut bytes = buf.freeze();
        let text = crate::codec::get_string(&mut bytes).unwrap();
        assert!(text.contains("\"text\""));
    }
}
