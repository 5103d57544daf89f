//! Shared wire-adjacent data types.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::codec::ensure;
use crate::error::ProtoError;
use crate::version::ProtocolVersion;

/// Eye height above the feet, in blocks. Identical in every supported era;
/// the canonical position keeps Y at eye level and each codec converts to
/// its own convention.
pub const EYE_HEIGHT: f64 = 1.62;

/// Entity id a player occupies on every wire dialect.
///
/// Player ids start at 0 but entity id 0 is reserved on several dialects, so
/// the whole wire family shifts by one. The entity codecs apply this on both
/// sides, which keeps player ids canonical everywhere above them.
pub fn wire_entity_id(player_id: i32) -> i32 {
    player_id + 1
}

/// Inverse of [`wire_entity_id`].
pub fn player_id_from_wire(entity_id: i32) -> i32 {
    entity_id - 1
}

/// Canonical player position: block units, Y at eye level.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Feet-level Y for this eye-level position.
    pub fn feet_y(self) -> f64 {
        self.y - EYE_HEIGHT
    }

    /// Block cell containing the feet.
    pub fn feet_block(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.feet_y().floor() as i32,
            self.z.floor() as i32,
        )
    }

    pub fn chunk_pos(self) -> ChunkPos {
        ChunkPos::containing(self.x, self.z)
    }
}

/// Rotation in degrees. One convention everywhere: yaw 0 faces +Z and grows
/// clockwise seen from above; pitch -90 is straight up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Look {
    pub yaw: f32,
    pub pitch: f32,
}

impl Look {
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }
}

/// Integer block cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing this cell. Arithmetic shift, so negatives floor.
    pub fn chunk_pos(self) -> ChunkPos {
        ChunkPos::new(self.x >> 4, self.z >> 4)
    }

    pub fn offset(self, face: BlockFace) -> BlockPos {
        let (dx, dy, dz) = face.offset();
        BlockPos::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Chunk column coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(x: f64, z: f64) -> Self {
        Self::new((x.floor() as i32) >> 4, (z.floor() as i32) >> 4)
    }

    /// Squared chunk distance, the nearest-first streaming order key.
    pub fn distance_sq(self, other: Self) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dz * dz
    }

    /// Block coordinate of this chunk's lowest corner.
    pub fn block_origin(self) -> (i32, i32) {
        (self.x << 4, self.z << 4)
    }
}

/// The six block faces, with the wire codes shared by the legacy and framed
/// dig/place packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFace {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl BlockFace {
    pub fn from_code(raw: u8) -> Result<Self, ProtoError> {
        match raw {
            0 => Ok(Self::Down),
            1 => Ok(Self::Up),
            2 => Ok(Self::North),
            3 => Ok(Self::South),
            4 => Ok(Self::West),
            5 => Ok(Self::East),
            other => Err(ProtoError::InvalidFace(other)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
            Self::North => 2,
            Self::South => 3,
            Self::West => 4,
            Self::East => 5,
        }
    }

    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Self::Down => (0, -1, 0),
            Self::Up => (0, 1, 0),
            Self::North => (0, 0, -1),
            Self::South => (0, 0, 1),
            Self::West => (-1, 0, 0),
            Self::East => (1, 0, 0),
        }
    }
}

/// An item stack as the inventory packets carry it.
///
/// Wire layout by era: a bare i16 id of -1 is the empty slot everywhere.
/// Present stacks add count and damage; legacy 39+ appends an i16 tag
/// length (-1 = none, payloads are skipped), framed 4/5 the same, framed
/// 47 a single end-marker byte. Non-empty tag payloads on the framed 47
/// layout cannot be skipped without a full tag parser and fail decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStack {
    pub id: i16,
    pub count: u8,
    pub damage: i16,
}

impl ItemStack {
    pub const fn new(id: i16, count: u8, damage: i16) -> Self {
        Self { id, count, damage }
    }

    pub fn write_opt(item: Option<&ItemStack>, buf: &mut impl BufMut, version: ProtocolVersion) {
        match item {
            None => buf.put_i16(-1),
            Some(it) => {
                buf.put_i16(it.id);
                buf.put_u8(it.count);
                buf.put_i16(it.damage);
                if version.at_least(ProtocolVersion::FRAMED_47) {
                    buf.put_u8(0);
                } else if version.at_least(ProtocolVersion::LEGACY_39) {
                    buf.put_i16(-1);
                }
            }
        }
    }

    pub fn read_opt(
        buf: &mut impl Buf,
        version: ProtocolVersion,
    ) -> Result<Option<ItemStack>, ProtoError> {
        ensure(buf, 2)?;
        let id = buf.get_i16();
        if id < 0 {
            return Ok(None);
        }
        ensure(buf, 3)?;
        let count = buf.get_u8();
        let damage = buf.get_i16();
        if version.at_least(ProtocolVersion::FRAMED_47) {
            ensure(buf, 1)?;
            if buf.get_u8() != 0 {
                return Err(ProtoError::UnsupportedItemPayload);
            }
        } else if version.at_least(ProtocolVersion::LEGACY_39) {
            ensure(buf, 2)?;
            let tag_len = buf.get_i16();
            if tag_len >= 0 {
                ensure(buf, tag_len as usize)?;
                buf.advance(tag_len as usize);
            }
        }
        Ok(Some(ItemStack { id, count, damage }))
    }
}

/// 128-bit player identity for the framed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Uuid {
    pub msb: u64,
    pub lsb: u64,
}

impl Uuid {
    pub const fn from_parts(msb: u64, lsb: u64) -> Self {
        Self { msb, lsb }
    }

    /// Parse dashed or bare 32-digit hex.
    pub fn parse(raw: &str) -> Result<Self, ProtoError> {
        let hex: String = raw.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return Err(ProtoError::InvalidUuid(raw.to_string()));
        }
        let (msb, lsb) = hex.split_at(16);
        let msb =
            u64::from_str_radix(msb, 16).map_err(|_| ProtoError::InvalidUuid(raw.to_string()))?;
        let lsb =
            u64::from_str_radix(lsb, 16).map_err(|_| ProtoError::InvalidUuid(raw.to_string()))?;
        Ok(Self { msb, lsb })
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut msb = [0u8; 8];
        let mut lsb = [0u8; 8];
        msb.copy_from_slice(&bytes[..8]);
        lsb.copy_from_slice(&bytes[8..]);
        Self {
            msb: u64::from_be_bytes(msb),
            lsb: u64::from_be_bytes(lsb),
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.msb.to_be_bytes());
        out[8..].copy_from_slice(&self.lsb.to_be_bytes());
        out
    }
}

impl fmt::Display for Uuid {
    /// Dashed lowercase hex, 8-4-4-4-12.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            self.msb >> 32,
            (self.msb >> 16) & 0xFFFF,
            self.msb & 0xFFFF,
            (self.lsb >> 48) & 0xFFFF,
            self.lsb & 0xFFFF_FFFF_FFFF
        )
    }
}
