//! Other-player entity packets. These all carry a *player* id in the
//! canonical struct; the wire entity id shift ([`wire_entity_id`]) is
//! applied symmetrically inside the codecs.
//!
//! Wire positions are feet-level fixed-point on the legacy and framed
//! families, eye-level i16 fixed-point on Classic; the canonical position
//! stays at eye level.

use bytes::{Buf, BufMut};

use crate::codec::{
    ensure, from_angle_byte, from_fixed32, from_fixed32_i16, get_classic_string, get_string,
    get_varint, put_classic_string, put_string, put_varint, to_angle_byte, to_fixed32,
    to_fixed32_i16,
};
use crate::error::ProtoError;
use crate::types::{player_id_from_wire, wire_entity_id, Look, Position, Uuid, EYE_HEIGHT};
use crate::version::ProtocolVersion;

/// Metadata terminator byte on the framed family.
const METADATA_END: u8 = 0x7F;

fn skip_metadata(buf: &mut impl Buf) -> Result<(), ProtoError> {
    loop {
        ensure(buf, 1)?;
        if buf.get_u8() == METADATA_END {
            return Ok(());
        }
    }
}

/// Clientbound: another player entered visible range.
///
/// The newest framed dialect dropped the username field and relies on a
/// preceding tab-list entry, so `username` decodes as empty there.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPlayer {
    pub player_id: i32,
    pub uuid: Uuid,
    pub username: String,
    pub pos: Position,
    pub look: Look,
    pub current_item: i16,
}

impl SpawnPlayer {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_classic() {
            ensure(buf, 1)?;
            let player_id = player_id_from_wire(buf.get_i8() as i32);
            let username = get_classic_string(buf)?;
            ensure(buf, 8)?;
            let x = from_fixed32_i16(buf.get_i16());
            let y = from_fixed32_i16(buf.get_i16());
            let z = from_fixed32_i16(buf.get_i16());
            let yaw = from_angle_byte(buf.get_u8());
            let pitch = from_angle_byte(buf.get_u8());
            return Ok(Self {
                player_id,
                uuid: Uuid::default(),
                username,
                pos: Position::new(x, y, z),
                look: Look { yaw, pitch },
                current_item: 0,
            });
        }
        if version.is_framed() {
            let player_id = player_id_from_wire(get_varint(buf)?);
            let (uuid, username) = if version.at_least(ProtocolVersion::FRAMED_47) {
                ensure(buf, 16)?;
                let mut raw = [0u8; 16];
                buf.copy_to_slice(&mut raw);
                (Uuid::from_bytes(raw), String::new())
            } else {
                let uuid = Uuid::parse(&get_string(buf)?)?;
                (uuid, get_string(buf)?)
            };
            ensure(buf, 16)?;
            let x = from_fixed32(buf.get_i32());
            let feet = from_fixed32(buf.get_i32());
            let z = from_fixed32(buf.get_i32());
            let yaw = from_angle_byte(buf.get_u8());
            let pitch = from_angle_byte(buf.get_u8());
            let current_item = buf.get_i16();
            skip_metadata(buf)?;
            return Ok(Self {
                player_id,
                uuid,
                username,
                pos: Position::new(x, feet + EYE_HEIGHT, z),
                look: Look { yaw, pitch },
                current_item,
            });
        }
        ensure(buf, 4)?;
        let player_id = player_id_from_wire(buf.get_i32());
        let username = crate::codec::get_string16(buf)?;
        ensure(buf, 16)?;
        let x = from_fixed32(buf.get_i32());
        let feet = from_fixed32(buf.get_i32());
        let z = from_fixed32(buf.get_i32());
        let yaw = from_angle_byte(buf.get_u8());
        let pitch = from_angle_byte(buf.get_u8());
        let current_item = buf.get_i16();
        Ok(Self {
            player_id,
            uuid: Uuid::default(),
            username,
            pos: Position::new(x, feet + EYE_HEIGHT, z),
            look: Look { yaw, pitch },
            current_item,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        let eid = wire_entity_id(self.player_id);
        if version.is_classic() {
            buf.put_i8(eid as i8);
            put_classic_string(buf, &self.username);
            buf.put_i16(to_fixed32_i16(self.pos.x));
            buf.put_i16(to_fixed32_i16(self.pos.y));
            buf.put_i16(to_fixed32_i16(self.pos.z));
            buf.put_u8(to_angle_byte(self.look.yaw));
            buf.put_u8(to_angle_byte(self.look.pitch));
            return Ok(());
        }
        if version.is_framed() {
            put_varint(buf, eid);
            if version.at_least(ProtocolVersion::FRAMED_47) {
                buf.put_slice(&self.uuid.to_bytes());
            } else {
                put_string(buf, &self.uuid.to_string());
                put_string(buf, &self.username);
            }
            buf.put_i32(to_fixed32(self.pos.x));
            buf.put_i32(to_fixed32(self.pos.feet_y()));
            buf.put_i32(to_fixed32(self.pos.z));
            buf.put_u8(to_angle_byte(self.look.yaw));
            buf.put_u8(to_angle_byte(self.look.pitch));
            buf.put_i16(self.current_item);
            buf.put_u8(METADATA_END);
            return Ok(());
        }
        buf.put_i32(eid);
        crate::codec::put_string16(buf, &self.username);
        buf.put_i32(to_fixed32(self.pos.x));
        buf.put_i32(to_fixed32(self.pos.feet_y()));
        buf.put_i32(to_fixed32(self.pos.z));
        buf.put_u8(to_angle_byte(self.look.yaw));
        buf.put_u8(to_angle_byte(self.look.pitch));
        buf.put_i16(self.current_item);
        Ok(())
    }
}

/// Clientbound: a player left visible range.
#[derive(Debug, Clone, PartialEq)]
pub struct DespawnPlayer {
    pub player_id: i32,
}

impl DespawnPlayer {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_classic() {
            ensure(buf, 1)?;
            return Ok(Self {
                player_id: player_id_from_wire(buf.get_i8() as i32),
            });
        }
        if version.is_framed() {
            let count = get_varint(buf)?;
            let mut player_id = 0;
            for i in 0..count {
                let id = player_id_from_wire(get_varint(buf)?);
                if i == 0 {
                    player_id = id;
                }
            }
            return Ok(Self { player_id });
        }
        if version.at_least(ProtocolVersion::LEGACY_39) {
            ensure(buf, 1)?;
            let count = buf.get_u8() as usize;
            ensure(buf, count * 4)?;
            let mut player_id = 0;
            for i in 0..count {
                let id = player_id_from_wire(buf.get_i32());
                if i == 0 {
                    player_id = id;
                }
            }
            Ok(Self { player_id })
        } else {
            ensure(buf, 4)?;
            Ok(Self {
                player_id: player_id_from_wire(buf.get_i32()),
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        let eid = wire_entity_id(self.player_id);
        if version.is_classic() {
            buf.put_i8(eid as i8);
        } else if version.is_framed() {
            put_varint(buf, 1);
            put_varint(buf, eid);
        } else if version.at_least(ProtocolVersion::LEGACY_39) {
            buf.put_u8(1);
            buf.put_i32(eid);
        } else {
            buf.put_i32(eid);
        }
        Ok(())
    }
}

/// Clientbound: absolute position of a visible player. Relative move deltas
/// are never sent; every update is a full teleport.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityTeleport {
    pub player_id: i32,
    pub pos: Position,
    pub look: Look,
    pub on_ground: bool,
}

impl EntityTeleport {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_classic() {
            ensure(buf, 9)?;
            let player_id = player_id_from_wire(buf.get_i8() as i32);
            let x = from_fixed32_i16(buf.get_i16());
            let y = from_fixed32_i16(buf.get_i16());
            let z = from_fixed32_i16(buf.get_i16());
            let yaw = from_angle_byte(buf.get_u8());
            let pitch = from_angle_byte(buf.get_u8());
            return Ok(Self {
                player_id,
                pos: Position::new(x, y, z),
                look: Look { yaw, pitch },
                on_ground: true,
            });
        }
        let player_id = if version.is_framed() {
            player_id_from_wire(get_varint(buf)?)
        } else {
            ensure(buf, 4)?;
            player_id_from_wire(buf.get_i32())
        };
        ensure(buf, 14)?;
        let x = from_fixed32(buf.get_i32());
        let feet = from_fixed32(buf.get_i32());
        let z = from_fixed32(buf.get_i32());
        let yaw = from_angle_byte(buf.get_u8());
        let pitch = from_angle_byte(buf.get_u8());
        let on_ground = if version.at_least(ProtocolVersion::FRAMED_47) {
            ensure(buf, 1)?;
            buf.get_u8() != 0
        } else {
            true
        };
        Ok(Self {
            player_id,
            pos: Position::new(x, feet + EYE_HEIGHT, z),
            look: Look { yaw, pitch },
            on_ground,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        let eid = wire_entity_id(self.player_id);
        if version.is_classic() {
            buf.put_i8(eid as i8);
            buf.put_i16(to_fixed32_i16(self.pos.x));
            buf.put_i16(to_fixed32_i16(self.pos.y));
            buf.put_i16(to_fixed32_i16(self.pos.z));
            buf.put_u8(to_angle_byte(self.look.yaw));
            buf.put_u8(to_angle_byte(self.look.pitch));
            return Ok(());
        }
        if version.is_framed() {
            put_varint(buf, eid);
        } else {
            buf.put_i32(eid);
        }
        buf.put_i32(to_fixed32(self.pos.x));
        buf.put_i32(to_fixed32(self.pos.feet_y()));
        buf.put_i32(to_fixed32(self.pos.z));
        buf.put_u8(to_angle_byte(self.look.yaw));
        buf.put_u8(to_angle_byte(self.look.pitch));
        if version.at_least(ProtocolVersion::FRAMED_47) {
            buf.put_u8(self.on_ground as u8);
        }
        Ok(())
    }
}

/// Arm swing animation. The serverbound framed form has no payload (the
/// sender is the connection itself); every other form carries the entity id.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingArm {
    pub player_id: i32,
}

impl SwingArm {
    /// Serverbound layout.
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_framed() {
            return Ok(Self { player_id: 0 });
        }
        ensure(buf, 5)?;
        let player_id = player_id_from_wire(buf.get_i32());
        buf.advance(1); // animation code
        Ok(Self { player_id })
    }

    /// Clientbound layout, which carries the id on every family.
    pub fn read_clientbound(
        buf: &mut impl Buf,
        version: ProtocolVersion,
    ) -> Result<Self, ProtoError> {
        if !version.is_framed() {
            return Self::read(buf, version);
        }
        let player_id = player_id_from_wire(get_varint(buf)?);
        ensure(buf, 1)?;
        buf.advance(1);
        Ok(Self { player_id })
    }

    /// Clientbound layout.
    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_classic() {
            return Err(ProtoError::UnsupportedVersion(version));
        }
        if version.is_framed() {
            put_varint(buf, wire_entity_id(self.player_id));
            buf.put_u8(0);
        } else {
            buf.put_i32(wire_entity_id(self.player_id));
            buf.put_u8(1);
        }
        Ok(())
    }
}
