//! The dual packet id tables.
//!
//! Legacy-family ids mean different things on different dialect numbers, so
//! that table is keyed by (version, direction, id). Framed-family ids are
//! stable across framed dialects but scoped to the connection state, so that
//! table is keyed by (state, direction, id). Both sides also keep a reverse
//! map from [`PacketKind`] for encoding.
//!
//! Registration is last-wins: a later insert for the same key silently
//! replaces the earlier one, which is how version exceptions are expressed.
//! A decode miss is an [`Option::None`] (the caller decides whether that is
//! skippable); a reverse miss is a hard [`RegistryError`], because asking
//! for the id of a packet a dialect cannot carry is a translator bug.
//!
//! A decoder may also return `Ok(None)`: the packet was understood and its
//! payload consumed, but it has no canonical meaning and is dropped. That is
//! how the chatty-but-irrelevant legacy packets (crouch toggles, window
//! closes, client locale) stay from killing the connection, since the legacy
//! wire gives no way to skip an unparsed body.

use std::collections::HashMap;

use bytes::{Buf, Bytes};
use thiserror::Error;

use crate::codec::{ensure, get_string16};
use crate::error::ProtoError;
use crate::packets::*;
use crate::version::{ConnectionState, Direction, ProtocolVersion};

/// Decode one packet body. `Ok(None)` means consumed-and-ignored.
pub type DecodeFn = fn(&mut Bytes, ProtocolVersion) -> Result<Option<Packet>, ProtoError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind:?} has no {direction:?} id on {version}")]
    MissingLegacyId {
        kind: PacketKind,
        direction: Direction,
        version: ProtocolVersion,
    },
    #[error("{kind:?} has no {direction:?} id in the {state:?} state")]
    MissingFramedId {
        kind: PacketKind,
        direction: Direction,
        state: ConnectionState,
    },
}

/// Immutable after [`PacketRegistry::build`]; share it behind an `Arc`.
pub struct PacketRegistry {
    legacy_decode: HashMap<(i32, Direction, u8), DecodeFn>,
    legacy_ids: HashMap<(i32, Direction, PacketKind), u8>,
    framed_decode: HashMap<(ConnectionState, Direction, i32), DecodeFn>,
    framed_ids: HashMap<(ConnectionState, Direction, PacketKind), i32>,
}

use Direction::{Clientbound, Serverbound};

const CLASSIC: &[i32] = &[0];
const BETA: &[i32] = &[7, 8, 9, 10, 11, 14, 17];
const RELEASE: &[i32] = &[23, 28, 29, 39, 51, 60, 61, 73, 78];
const BETA_AND_RELEASE: &[i32] = &[7, 8, 9, 10, 11, 14, 17, 23, 28, 29, 39, 51, 60, 61, 73, 78];
const TABLIST_ERA: &[i32] = &[39, 51, 60, 61, 73, 78];
const DUAL_CLICK_ERA: &[i32] = &[73, 78];

impl PacketRegistry {
    /// Build the complete table for every supported dialect.
    pub fn build() -> Self {
        let mut reg = Self {
            legacy_decode: HashMap::new(),
            legacy_ids: HashMap::new(),
            framed_decode: HashMap::new(),
            framed_ids: HashMap::new(),
        };
        reg.register_classic();
        reg.register_legacy();
        reg.register_framed();
        reg
    }

    // ── lookups ─────────────────────────────────────────────────────────────

    pub fn decode_legacy(
        &self,
        version: ProtocolVersion,
        direction: Direction,
        id: u8,
    ) -> Option<DecodeFn> {
        self.legacy_decode
            .get(&(version.number, direction, id))
            .copied()
    }

    pub fn decode_framed(
        &self,
        state: ConnectionState,
        direction: Direction,
        id: i32,
    ) -> Option<DecodeFn> {
        self.framed_decode.get(&(state, direction, id)).copied()
    }

    pub fn legacy_id(
        &self,
        version: ProtocolVersion,
        direction: Direction,
        kind: PacketKind,
    ) -> Result<u8, RegistryError> {
        self.legacy_ids
            .get(&(version.number, direction, kind))
            .copied()
            .ok_or(RegistryError::MissingLegacyId {
                kind,
                direction,
                version,
            })
    }

    pub fn framed_id(
        &self,
        state: ConnectionState,
        direction: Direction,
        kind: PacketKind,
    ) -> Result<i32, RegistryError> {
        self.framed_ids
            .get(&(state, direction, kind))
            .copied()
            .ok_or(RegistryError::MissingFramedId {
                kind,
                direction,
                state,
            })
    }

    // ── registration ────────────────────────────────────────────────────────

    fn legacy(
        &mut self,
        versions: &[i32],
        direction: Direction,
        id: u8,
        kind: PacketKind,
        decode: DecodeFn,
    ) {
        for &v in versions {
            self.legacy_decode.insert((v, direction, id), decode);
            self.legacy_ids.insert((v, direction, kind), id);
        }
    }

    /// Decode-only entry: consumed and dropped, no reverse id.
    fn legacy_skip(&mut self, versions: &[i32], direction: Direction, id: u8, decode: DecodeFn) {
        for &v in versions {
            self.legacy_decode.insert((v, direction, id), decode);
        }
    }

    fn framed(
        &mut self,
        state: ConnectionState,
        direction: Direction,
        id: i32,
        kind: PacketKind,
        decode: DecodeFn,
    ) {
        self.framed_decode.insert((state, direction, id), decode);
        self.framed_ids.insert((state, direction, kind), id);
    }

    /// Reverse-only entry for a packet that shares another packet's id on
    /// the wire and is never decoded under its own name.
    fn framed_alias(&mut self, state: ConnectionState, direction: Direction, kind: PacketKind, id: i32) {
        self.framed_ids.insert((state, direction, kind), id);
    }

    fn register_classic(&mut self) {
        self.legacy(CLASSIC, Serverbound, 0x00, PacketKind::ClassicIdentRequest, |b, v| {
            Ok(Some(ClassicIdentRequest::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Serverbound, 0x05, PacketKind::ClassicSetBlock, |b, v| {
            Ok(Some(ClassicSetBlock::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Serverbound, 0x08, PacketKind::PlayerPositionLook, |b, v| {
            Ok(Some(PlayerPositionLook::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Serverbound, 0x0D, PacketKind::Chat, |b, v| {
            Ok(Some(Chat::read(b, v)?.into()))
        });

        self.legacy(CLASSIC, Clientbound, 0x00, PacketKind::ClassicIdentReply, |b, v| {
            Ok(Some(ClassicIdentReply::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x01, PacketKind::ClassicPing, |b, v| {
            Ok(Some(ClassicPing::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x02, PacketKind::ClassicLevelInit, |b, v| {
            Ok(Some(ClassicLevelInit::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x03, PacketKind::ClassicLevelChunk, |b, v| {
            Ok(Some(ClassicLevelChunk::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x04, PacketKind::ClassicLevelFinalize, |b, v| {
            Ok(Some(ClassicLevelFinalize::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x06, PacketKind::BlockChange, |b, v| {
            Ok(Some(BlockChange::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x07, PacketKind::SpawnPlayer, |b, v| {
            Ok(Some(SpawnPlayer::read(b, v)?.into()))
        });
        // Self-teleport and other-player teleport share classic id 0x08; the
        // later registration wins the decode slot, both keep a reverse id.
        self.legacy(CLASSIC, Clientbound, 0x08, PacketKind::PositionLook, |b, v| {
            Ok(Some(PositionLook::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x08, PacketKind::EntityTeleport, |b, v| {
            Ok(Some(EntityTeleport::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x0C, PacketKind::DespawnPlayer, |b, v| {
            Ok(Some(DespawnPlayer::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x0D, PacketKind::Chat, |b, v| {
            Ok(Some(Chat::read(b, v)?.into()))
        });
        self.legacy(CLASSIC, Clientbound, 0x0E, PacketKind::Disconnect, |b, v| {
            Ok(Some(Disconnect::read(b, v)?.into()))
        });
    }

    fn register_legacy(&mut self) {
        // Serverbound, shared by the whole beta/release era.
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x00, PacketKind::KeepAlive, |b, v| {
            Ok(Some(KeepAlive::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x01, PacketKind::LegacyLoginRequest, |b, v| {
            Ok(Some(LegacyLoginRequest::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x02, PacketKind::LegacyHandshakeRequest, |b, v| {
            Ok(Some(LegacyHandshakeRequest::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x03, PacketKind::Chat, |b, v| {
            Ok(Some(Chat::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x0A, PacketKind::PlayerOnGround, |b, v| {
            Ok(Some(PlayerOnGround::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x0B, PacketKind::PlayerPosition, |b, v| {
            Ok(Some(PlayerPosition::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x0C, PacketKind::PlayerLook, |b, v| {
            Ok(Some(PlayerLook::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x0D, PacketKind::PlayerPositionLook, |b, v| {
            Ok(Some(PlayerPositionLook::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x0E, PacketKind::BlockDig, |b, v| {
            Ok(Some(BlockDig::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x0F, PacketKind::BlockPlace, |b, v| {
            Ok(Some(BlockPlace::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x10, PacketKind::HeldItemChange, |b, v| {
            Ok(Some(HeldItemChange::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0x12, PacketKind::SwingArm, |b, v| {
            Ok(Some(SwingArm::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Serverbound, 0xFF, PacketKind::Disconnect, |b, v| {
            Ok(Some(Disconnect::read(b, v)?.into()))
        });
        self.legacy(RELEASE, Serverbound, 0x6B, PacketKind::CreativeSlot, |b, v| {
            Ok(Some(CreativeSlot::read(b, v)?.into()))
        });

        // Understood-but-dropped serverbound traffic. The legacy wire has no
        // frame lengths, so each of these must consume its exact payload.
        self.legacy_skip(BETA_AND_RELEASE, Serverbound, 0x07, |b, _| {
            // use entity: ids only
            ensure(b, 8)?;
            b.advance(8);
            Ok(None)
        });
        self.legacy_skip(DUAL_CLICK_ERA, Serverbound, 0x07, |b, _| {
            // use entity grew a mouse-button byte
            ensure(b, 9)?;
            b.advance(9);
            Ok(None)
        });
        self.legacy_skip(BETA_AND_RELEASE, Serverbound, 0x13, |b, _| {
            // entity action (crouch, sprint)
            ensure(b, 5)?;
            b.advance(5);
            Ok(None)
        });
        self.legacy_skip(BETA_AND_RELEASE, Serverbound, 0x65, |b, _| {
            // close window
            ensure(b, 1)?;
            b.advance(1);
            Ok(None)
        });
        self.legacy_skip(TABLIST_ERA, Serverbound, 0xCC, |b, _| {
            // client locale and view settings
            get_string16(b)?;
            ensure(b, 4)?;
            b.advance(4);
            Ok(None)
        });
        self.legacy_skip(TABLIST_ERA, Serverbound, 0xCD, |b, _| {
            // client status (login done / respawn request)
            ensure(b, 1)?;
            b.advance(1);
            Ok(None)
        });

        // Clientbound.
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x00, PacketKind::KeepAlive, |b, v| {
            Ok(Some(KeepAlive::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x01, PacketKind::LegacyLoginReply, |b, v| {
            Ok(Some(LegacyLoginReply::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x02, PacketKind::LegacyHandshakeReply, |b, v| {
            Ok(Some(LegacyHandshakeReply::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x03, PacketKind::Chat, |b, v| {
            Ok(Some(Chat::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x04, PacketKind::TimeUpdate, |b, v| {
            Ok(Some(TimeUpdate::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x06, PacketKind::SpawnPosition, |b, v| {
            Ok(Some(SpawnPosition::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x0D, PacketKind::PositionLook, |b, v| {
            Ok(Some(PositionLook::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x12, PacketKind::SwingArm, |b, v| {
            Ok(Some(SwingArm::read_clientbound(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x14, PacketKind::SpawnPlayer, |b, v| {
            Ok(Some(SpawnPlayer::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x1D, PacketKind::DespawnPlayer, |b, v| {
            Ok(Some(DespawnPlayer::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x22, PacketKind::EntityTeleport, |b, v| {
            Ok(Some(EntityTeleport::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x32, PacketKind::PreChunk, |b, v| {
            Ok(Some(PreChunk::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x33, PacketKind::ChunkData, |b, v| {
            Ok(Some(ChunkData::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x35, PacketKind::BlockChange, |b, v| {
            Ok(Some(BlockChange::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0x67, PacketKind::SetSlot, |b, v| {
            Ok(Some(SetSlot::read(b, v)?.into()))
        });
        self.legacy(BETA_AND_RELEASE, Clientbound, 0xFF, PacketKind::Disconnect, |b, v| {
            Ok(Some(Disconnect::read(b, v)?.into()))
        });
        self.legacy(TABLIST_ERA, Clientbound, 0xC9, PacketKind::PlayerListItem, |b, v| {
            Ok(Some(PlayerListItem::read(b, v)?.into()))
        });
    }

    fn register_framed(&mut self) {
        use ConnectionState::{Handshaking, Login, Play, Status};

        self.framed(Handshaking, Serverbound, 0x00, PacketKind::Handshake, |b, v| {
            Ok(Some(Handshake::read(b, v)?.into()))
        });

        self.framed(Status, Serverbound, 0x00, PacketKind::StatusRequest, |b, v| {
            Ok(Some(StatusRequest::read(b, v)?.into()))
        });
        self.framed(Status, Serverbound, 0x01, PacketKind::StatusPing, |b, v| {
            Ok(Some(StatusPing::read(b, v)?.into()))
        });
        self.framed(Status, Clientbound, 0x00, PacketKind::StatusResponse, |b, v| {
            Ok(Some(StatusResponse::read(b, v)?.into()))
        });
        self.framed(Status, Clientbound, 0x01, PacketKind::StatusPong, |b, v| {
            Ok(Some(StatusPong::read(b, v)?.into()))
        });

        self.framed(Login, Serverbound, 0x00, PacketKind::LoginStart, |b, v| {
            Ok(Some(LoginStart::read(b, v)?.into()))
        });
        self.framed(Login, Serverbound, 0x01, PacketKind::EncryptionResponse, |b, v| {
            Ok(Some(EncryptionResponse::read(b, v)?.into()))
        });
        self.framed(Login, Clientbound, 0x00, PacketKind::LoginDisconnect, |b, v| {
            Ok(Some(LoginDisconnect::read(b, v)?.into()))
        });
        self.framed(Login, Clientbound, 0x01, PacketKind::EncryptionRequest, |b, v| {
            Ok(Some(EncryptionRequest::read(b, v)?.into()))
        });
        self.framed(Login, Clientbound, 0x02, PacketKind::LoginSuccess, |b, v| {
            Ok(Some(LoginSuccess::read(b, v)?.into()))
        });

        self.framed(Play, Serverbound, 0x00, PacketKind::KeepAlive, |b, v| {
            Ok(Some(KeepAlive::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x01, PacketKind::Chat, |b, v| {
            Ok(Some(Chat::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x03, PacketKind::PlayerOnGround, |b, v| {
            Ok(Some(PlayerOnGround::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x04, PacketKind::PlayerPosition, |b, v| {
            Ok(Some(PlayerPosition::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x05, PacketKind::PlayerLook, |b, v| {
            Ok(Some(PlayerLook::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x06, PacketKind::PlayerPositionLook, |b, v| {
            Ok(Some(PlayerPositionLook::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x07, PacketKind::BlockDig, |b, v| {
            Ok(Some(BlockDig::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x08, PacketKind::BlockPlace, |b, v| {
            Ok(Some(BlockPlace::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x09, PacketKind::HeldItemChange, |b, v| {
            Ok(Some(HeldItemChange::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x0A, PacketKind::SwingArm, |b, v| {
            Ok(Some(SwingArm::read(b, v)?.into()))
        });
        self.framed(Play, Serverbound, 0x10, PacketKind::CreativeSlot, |b, v| {
            Ok(Some(CreativeSlot::read(b, v)?.into()))
        });

        self.framed(Play, Clientbound, 0x00, PacketKind::KeepAlive, |b, v| {
            Ok(Some(KeepAlive::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x01, PacketKind::JoinGame, |b, v| {
            Ok(Some(JoinGame::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x02, PacketKind::Chat, |b, v| {
            Ok(Some(Chat::read_json(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x03, PacketKind::TimeUpdate, |b, v| {
            Ok(Some(TimeUpdate::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x05, PacketKind::SpawnPosition, |b, v| {
            Ok(Some(SpawnPosition::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x08, PacketKind::PositionLook, |b, v| {
            Ok(Some(PositionLook::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x0B, PacketKind::SwingArm, |b, v| {
            Ok(Some(SwingArm::read_clientbound(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x0C, PacketKind::SpawnPlayer, |b, v| {
            Ok(Some(SpawnPlayer::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x13, PacketKind::DespawnPlayer, |b, v| {
            Ok(Some(DespawnPlayer::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x18, PacketKind::EntityTeleport, |b, v| {
            Ok(Some(EntityTeleport::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x21, PacketKind::ChunkData, |b, v| {
            Ok(Some(ChunkData::read(b, v)?.into()))
        });
        // A column release is a column header with an empty mask; it rides
        // the same id and only exists in reverse.
        self.framed_alias(Play, Clientbound, PacketKind::ChunkUnload, 0x21);
        self.framed(Play, Clientbound, 0x23, PacketKind::BlockChange, |b, v| {
            Ok(Some(BlockChange::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x2F, PacketKind::SetSlot, |b, v| {
            Ok(Some(SetSlot::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x38, PacketKind::PlayerListItem, |b, v| {
            Ok(Some(PlayerListItem::read(b, v)?.into()))
        });
        self.framed(Play, Clientbound, 0x40, PacketKind::Disconnect, |b, v| {
            Ok(Some(Disconnect::read(b, v)?.into()))
        });
    }
}
