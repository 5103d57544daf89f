//! World-info and session-info packets.

use bytes::{Buf, BufMut};

use crate::codec::{
    ensure, get_block_pos_packed, get_classic_string, get_string, get_string16, get_varint,
    json_text, json_text_unwrap, put_block_pos_packed, put_classic_string, put_string,
    put_string16, put_varint,
};
use crate::error::ProtoError;
use crate::types::{BlockPos, Uuid};
use crate::version::ProtocolVersion;

/// Clientbound: the world spawn block, shown as the compass target.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPosition {
    pub pos: BlockPos,
}

impl SpawnPosition {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.at_least(ProtocolVersion::FRAMED_47) {
            Ok(Self {
                pos: get_block_pos_packed(buf)?,
            })
        } else {
            ensure(buf, 12)?;
            Ok(Self {
                pos: BlockPos::new(buf.get_i32(), buf.get_i32(), buf.get_i32()),
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.at_least(ProtocolVersion::FRAMED_47) {
            put_block_pos_packed(buf, self.pos);
        } else {
            buf.put_i32(self.pos.x);
            buf.put_i32(self.pos.y);
            buf.put_i32(self.pos.z);
        }
        Ok(())
    }
}

/// Clientbound: world age and time of day. The oldest dialects carry only
/// the time field.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUpdate {
    pub world_age: i64,
    pub time: i64,
}

impl TimeUpdate {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_framed() || version.at_least(ProtocolVersion::LEGACY_39) {
            ensure(buf, 16)?;
            Ok(Self {
                world_age: buf.get_i64(),
                time: buf.get_i64(),
            })
        } else {
            ensure(buf, 8)?;
            Ok(Self {
                world_age: 0,
                time: buf.get_i64(),
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_framed() || version.at_least(ProtocolVersion::LEGACY_39) {
            buf.put_i64(self.world_age);
            buf.put_i64(self.time);
        } else {
            buf.put_i64(self.time);
        }
        Ok(())
    }
}

/// Clientbound tab-list entry. Dialects without a tab list never get this
/// registered; the newest framed dialect uses the action-list form.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerListItem {
    pub username: String,
    pub uuid: Uuid,
    pub online: bool,
    pub ping: i16,
}

impl PlayerListItem {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.at_least(ProtocolVersion::FRAMED_47) {
            let action = get_varint(buf)?;
            let _count = get_varint(buf)?;
            ensure(buf, 16)?;
            let mut raw = [0u8; 16];
            buf.copy_to_slice(&mut raw);
            let uuid = Uuid::from_bytes(raw);
            if action == 0 {
                let username = get_string(buf)?;
                let _properties = get_varint(buf)?;
                let _gamemode = get_varint(buf)?;
                let ping = get_varint(buf)? as i16;
                ensure(buf, 1)?;
                buf.advance(1); // display-name flag, never set
                Ok(Self {
                    username,
                    uuid,
                    online: true,
                    ping,
                })
            } else {
                Ok(Self {
                    username: String::new(),
                    uuid,
                    online: false,
                    ping: 0,
                })
            }
        } else if version.is_framed() {
            let username = get_string(buf)?;
            ensure(buf, 3)?;
            Ok(Self {
                username,
                uuid: Uuid::default(),
                online: buf.get_u8() != 0,
                ping: buf.get_i16(),
            })
        } else {
            let username = get_string16(buf)?;
            ensure(buf, 3)?;
            Ok(Self {
                username,
                uuid: Uuid::default(),
                online: buf.get_u8() != 0,
                ping: buf.get_i16(),
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.at_least(ProtocolVersion::FRAMED_47) {
            put_varint(buf, if self.online { 0 } else { 4 });
            put_varint(buf, 1);
            buf.put_slice(&self.uuid.to_bytes());
            if self.online {
                put_string(buf, &self.username);
                put_varint(buf, 0); // properties
                put_varint(buf, 0); // gamemode
                put_varint(buf, self.ping as i32);
                buf.put_u8(0); // no display name
            }
        } else if version.is_framed() {
            put_string(buf, &self.username);
            buf.put_u8(self.online as u8);
            buf.put_i16(self.ping);
        } else {
            put_string16(buf, &self.username);
            buf.put_u8(self.online as u8);
            buf.put_i16(self.ping);
        }
        Ok(())
    }
}

/// Disconnect with a human-readable reason. Every family has one; only the
/// encoding differs.
#[derive(Debug, Clone, PartialEq)]
pub struct Disconnect {
    pub reason: String,
}

impl Disconnect {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        let reason = if version.is_classic() {
            get_classic_string(buf)?
        } else if version.is_framed() {
            json_text_unwrap(&get_string(buf)?)
        } else {
            get_string16(buf)?
        };
        Ok(Self { reason })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_classic() {
            put_classic_string(buf, &self.reason);
        } else if version.is_framed() {
            put_string(buf, &json_text(&self.reason));
        } else {
            put_string16(buf, &self.reason);
        }
        Ok(())
    }
}
