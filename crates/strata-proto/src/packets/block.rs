//! Block interaction packets: digging, placement, and the authoritative
//! block change the server answers with.

use bytes::{Buf, BufMut};

use crate::codec::{ensure, get_block_pos_packed, get_varint, put_block_pos_packed, put_varint};
use crate::error::ProtoError;
use crate::types::{BlockFace, BlockPos, ItemStack};
use crate::version::ProtocolVersion;

/// What stage of digging a [`BlockDig`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigStatus {
    Started,
    Cancelled,
    Finished,
    DropStack,
    DropItem,
    ReleaseUseItem,
}

impl DigStatus {
    pub fn from_code(raw: u8) -> Result<Self, ProtoError> {
        match raw {
            0 => Ok(Self::Started),
            1 => Ok(Self::Cancelled),
            2 => Ok(Self::Finished),
            3 => Ok(Self::DropStack),
            4 => Ok(Self::DropItem),
            5 => Ok(Self::ReleaseUseItem),
            other => Err(ProtoError::InvalidDigStatus(other)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Started => 0,
            Self::Cancelled => 1,
            Self::Finished => 2,
            Self::DropStack => 3,
            Self::DropItem => 4,
            Self::ReleaseUseItem => 5,
        }
    }
}

/// Serverbound digging action.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDig {
    pub status: DigStatus,
    pub pos: BlockPos,
    pub face: BlockFace,
}

impl BlockDig {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 1)?;
        let status = DigStatus::from_code(buf.get_u8())?;
        let pos = if version.at_least(ProtocolVersion::FRAMED_47) {
            get_block_pos_packed(buf)?
        } else if version.is_framed() {
            ensure(buf, 9)?;
            BlockPos::new(buf.get_i32(), buf.get_u8() as i32, buf.get_i32())
        } else {
            ensure(buf, 9)?;
            BlockPos::new(buf.get_i32(), buf.get_i8() as i32, buf.get_i32())
        };
        ensure(buf, 1)?;
        let face = BlockFace::from_code(buf.get_u8())?;
        Ok(Self { status, pos, face })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_u8(self.status.code());
        if version.at_least(ProtocolVersion::FRAMED_47) {
            put_block_pos_packed(buf, self.pos);
        } else if version.is_framed() {
            buf.put_i32(self.pos.x);
            buf.put_u8(self.pos.y as u8);
            buf.put_i32(self.pos.z);
        } else {
            buf.put_i32(self.pos.x);
            buf.put_i8(self.pos.y as i8);
            buf.put_i32(self.pos.z);
        }
        buf.put_u8(self.face.code());
        Ok(())
    }
}

/// Serverbound block placement. Wire face 255 means "use held item in air";
/// the position fields are then all -1 and carry no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlace {
    pub pos: BlockPos,
    pub face: Option<BlockFace>,
    pub held: Option<ItemStack>,
}

impl BlockPlace {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        let pos;
        let raw_face;
        if version.at_least(ProtocolVersion::FRAMED_47) {
            pos = get_block_pos_packed(buf)?;
            ensure(buf, 1)?;
            raw_face = buf.get_u8();
        } else {
            ensure(buf, 10)?;
            pos = BlockPos::new(buf.get_i32(), buf.get_u8() as i32, buf.get_i32());
            raw_face = buf.get_u8();
        }
        let face = if raw_face == 255 {
            None
        } else {
            Some(BlockFace::from_code(raw_face)?)
        };
        let held = ItemStack::read_opt(buf, version)?;
        if version.is_framed() {
            ensure(buf, 3)?;
            buf.advance(3); // cursor position within the block
        }
        Ok(Self { pos, face, held })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.at_least(ProtocolVersion::FRAMED_47) {
            put_block_pos_packed(buf, self.pos);
        } else {
            buf.put_i32(self.pos.x);
            buf.put_u8(self.pos.y as u8);
            buf.put_i32(self.pos.z);
        }
        buf.put_u8(self.face.map_or(255, BlockFace::code));
        ItemStack::write_opt(self.held.as_ref(), buf, version);
        if version.is_framed() {
            buf.put_bytes(8, 3);
        }
        Ok(())
    }
}

/// Clientbound authoritative block change.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockChange {
    pub pos: BlockPos,
    pub block_id: u8,
    pub meta: u8,
}

impl BlockChange {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_classic() {
            ensure(buf, 7)?;
            return Ok(Self {
                pos: BlockPos::new(
                    buf.get_i16() as i32,
                    buf.get_i16() as i32,
                    buf.get_i16() as i32,
                ),
                block_id: buf.get_u8(),
                meta: 0,
            });
        }
        if version.at_least(ProtocolVersion::FRAMED_47) {
            let pos = get_block_pos_packed(buf)?;
            let state = get_varint(buf)?;
            Ok(Self {
                pos,
                block_id: (state >> 4) as u8,
                meta: (state & 0xF) as u8,
            })
        } else if version.is_framed() {
            ensure(buf, 9)?;
            let pos = BlockPos::new(buf.get_i32(), buf.get_u8() as i32, buf.get_i32());
            let block_id = get_varint(buf)? as u8;
            ensure(buf, 1)?;
            let meta = buf.get_u8();
            Ok(Self {
                pos,
                block_id,
                meta,
            })
        } else {
            ensure(buf, 11)?;
            Ok(Self {
                pos: BlockPos::new(buf.get_i32(), buf.get_u8() as i32, buf.get_i32()),
                block_id: buf.get_u8(),
                meta: buf.get_u8(),
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_classic() {
            buf.put_i16(self.pos.x as i16);
            buf.put_i16(self.pos.y as i16);
            buf.put_i16(self.pos.z as i16);
            buf.put_u8(self.block_id);
            return Ok(());
        }
        if version.at_least(ProtocolVersion::FRAMED_47) {
            put_block_pos_packed(buf, self.pos);
            put_varint(buf, ((self.block_id as i32) << 4) | (self.meta as i32));
        } else if version.is_framed() {
            buf.put_i32(self.pos.x);
            buf.put_u8(self.pos.y as u8);
            buf.put_i32(self.pos.z);
            put_varint(buf, self.block_id as i32);
            buf.put_u8(self.meta);
        } else {
            buf.put_i32(self.pos.x);
            buf.put_u8(self.pos.y as u8);
            buf.put_i32(self.pos.z);
            buf.put_u8(self.block_id);
            buf.put_u8(self.meta);
        }
        Ok(())
    }
}
