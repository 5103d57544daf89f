//! Movement packets. Canonical positions are f64 at eye level; each dialect
//! stores some mix of feet and eye coordinates, so every read and write
//! converts explicitly.
//!
//! The serverbound double-precision layouts carry both the feet coordinate
//! and the stance (eye) coordinate; the canonical value is the stance. The
//! clientbound correction packet swaps the field order on legacy dialects
//! and carries a single y whose meaning differs per tier.

use bytes::{Buf, BufMut};

use crate::codec::{ensure, from_angle_byte, from_fixed32_i16, to_angle_byte, to_fixed32_i16};
use crate::error::ProtoError;
use crate::types::{Look, Position, EYE_HEIGHT};
use crate::version::ProtocolVersion;

fn get_bool(buf: &mut impl Buf) -> Result<bool, ProtoError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

/// Serverbound position update.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPosition {
    pub pos: Position,
    pub on_ground: bool,
}

impl PlayerPosition {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.at_least(ProtocolVersion::FRAMED_47) {
            ensure(buf, 24)?;
            let x = buf.get_f64();
            let feet = buf.get_f64();
            let z = buf.get_f64();
            let on_ground = get_bool(buf)?;
            Ok(Self {
                pos: Position::new(x, feet + EYE_HEIGHT, z),
                on_ground,
            })
        } else {
            ensure(buf, 32)?;
            let x = buf.get_f64();
            let _feet = buf.get_f64();
            let stance = buf.get_f64();
            let z = buf.get_f64();
            let on_ground = get_bool(buf)?;
            Ok(Self {
                pos: Position::new(x, stance, z),
                on_ground,
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.at_least(ProtocolVersion::FRAMED_47) {
            buf.put_f64(self.pos.x);
            buf.put_f64(self.pos.feet_y());
            buf.put_f64(self.pos.z);
        } else {
            buf.put_f64(self.pos.x);
            buf.put_f64(self.pos.feet_y());
            buf.put_f64(self.pos.y);
            buf.put_f64(self.pos.z);
        }
        buf.put_u8(self.on_ground as u8);
        Ok(())
    }
}

/// Serverbound look update. Same shape on every double-precision dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLook {
    pub look: Look,
    pub on_ground: bool,
}

impl PlayerLook {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 9)?;
        let yaw = buf.get_f32();
        let pitch = buf.get_f32();
        let on_ground = buf.get_u8() != 0;
        Ok(Self {
            look: Look { yaw, pitch },
            on_ground,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_f32(self.look.yaw);
        buf.put_f32(self.look.pitch);
        buf.put_u8(self.on_ground as u8);
        Ok(())
    }
}

/// Serverbound combined position and look. On classic this is the only
/// movement packet; the leading player id byte is ignored serverbound.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPositionLook {
    pub pos: Position,
    pub look: Look,
    pub on_ground: bool,
}

impl PlayerPositionLook {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_classic() {
            ensure(buf, 9)?;
            buf.advance(1); // player id
            let x = from_fixed32_i16(buf.get_i16());
            let y = from_fixed32_i16(buf.get_i16());
            let z = from_fixed32_i16(buf.get_i16());
            let yaw = from_angle_byte(buf.get_u8());
            let pitch = from_angle_byte(buf.get_u8());
            return Ok(Self {
                pos: Position::new(x, y, z),
                look: Look { yaw, pitch },
                on_ground: true,
            });
        }
        if version.at_least(ProtocolVersion::FRAMED_47) {
            ensure(buf, 32)?;
            let x = buf.get_f64();
            let feet = buf.get_f64();
            let z = buf.get_f64();
            let yaw = buf.get_f32();
            let pitch = buf.get_f32();
            let on_ground = get_bool(buf)?;
            Ok(Self {
                pos: Position::new(x, feet + EYE_HEIGHT, z),
                look: Look { yaw, pitch },
                on_ground,
            })
        } else {
            ensure(buf, 40)?;
            let x = buf.get_f64();
            let _feet = buf.get_f64();
            let stance = buf.get_f64();
            let z = buf.get_f64();
            let yaw = buf.get_f32();
            let pitch = buf.get_f32();
            let on_ground = get_bool(buf)?;
            Ok(Self {
                pos: Position::new(x, stance, z),
                look: Look { yaw, pitch },
                on_ground,
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_classic() {
            buf.put_i8(-1);
            buf.put_i16(to_fixed32_i16(self.pos.x));
            buf.put_i16(to_fixed32_i16(self.pos.y));
            buf.put_i16(to_fixed32_i16(self.pos.z));
            buf.put_u8(to_angle_byte(self.look.yaw));
            buf.put_u8(to_angle_byte(self.look.pitch));
            return Ok(());
        }
        if version.at_least(ProtocolVersion::FRAMED_47) {
            buf.put_f64(self.pos.x);
            buf.put_f64(self.pos.feet_y());
            buf.put_f64(self.pos.z);
        } else {
            buf.put_f64(self.pos.x);
            buf.put_f64(self.pos.feet_y());
            buf.put_f64(self.pos.y);
            buf.put_f64(self.pos.z);
        }
        buf.put_f32(self.look.yaw);
        buf.put_f32(self.look.pitch);
        buf.put_u8(self.on_ground as u8);
        Ok(())
    }
}

/// Serverbound bare on-ground heartbeat: the flag with no coordinates.
/// Sent every tick a double-precision client stands still.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOnGround {
    pub on_ground: bool,
}

impl PlayerOnGround {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            on_ground: get_bool(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_u8(self.on_ground as u8);
        Ok(())
    }
}

/// Clientbound position correction. Snaps the client to an authoritative
/// position; the client must accept it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLook {
    pub pos: Position,
    pub look: Look,
    pub on_ground: bool,
}

impl PositionLook {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_classic() {
            let inner = PlayerPositionLook::read(buf, version)?;
            return Ok(Self {
                pos: inner.pos,
                look: inner.look,
                on_ground: inner.on_ground,
            });
        }
        if version.is_framed() {
            ensure(buf, 33)?;
            let x = buf.get_f64();
            let y = buf.get_f64();
            let z = buf.get_f64();
            let yaw = buf.get_f32();
            let pitch = buf.get_f32();
            let (eye, on_ground) = if version.at_least(ProtocolVersion::FRAMED_47) {
                buf.advance(1); // relative flags, always absolute here
                (y + EYE_HEIGHT, true)
            } else {
                (y, get_bool(buf)?)
            };
            Ok(Self {
                pos: Position::new(x, eye, z),
                look: Look { yaw, pitch },
                on_ground,
            })
        } else {
            // Legacy swaps y and stance relative to the serverbound layout.
            ensure(buf, 41)?;
            let x = buf.get_f64();
            let stance = buf.get_f64();
            let _feet = buf.get_f64();
            let z = buf.get_f64();
            let yaw = buf.get_f32();
            let pitch = buf.get_f32();
            let on_ground = get_bool(buf)?;
            Ok(Self {
                pos: Position::new(x, stance, z),
                look: Look { yaw, pitch },
                on_ground,
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_classic() {
            return PlayerPositionLook {
                pos: self.pos,
                look: self.look,
                on_ground: self.on_ground,
            }
            .write(buf, version);
        }
        if version.is_framed() {
            buf.put_f64(self.pos.x);
            if version.at_least(ProtocolVersion::FRAMED_47) {
                buf.put_f64(self.pos.feet_y());
            } else {
                buf.put_f64(self.pos.y);
            }
            buf.put_f64(self.pos.z);
            buf.put_f32(self.look.yaw);
            buf.put_f32(self.look.pitch);
            if version.at_least(ProtocolVersion::FRAMED_47) {
                buf.put_u8(0);
            } else {
                buf.put_u8(self.on_ground as u8);
            }
        } else {
            buf.put_f64(self.pos.x);
            buf.put_f64(self.pos.y);
            buf.put_f64(self.pos.feet_y());
            buf.put_f64(self.pos.z);
            buf.put_f32(self.look.yaw);
            buf.put_f32(self.look.pitch);
            buf.put_u8(self.on_ground as u8);
        }
        Ok(())
    }
}
