//! Classic-family packets: fixed-length payloads, 64-byte padded strings,
//! absolute i16 fixed-point coordinates at eye level.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{ensure, get_classic_string, put_classic_string};
use crate::error::ProtoError;
use crate::version::ProtocolVersion;

/// Largest level-data piece a single 0x03 packet carries.
pub const LEVEL_CHUNK_LEN: usize = 1024;

/// Client 0x00: identification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicIdentRequest {
    pub protocol: u8,
    pub username: String,
    pub verify_key: String,
}

impl ClassicIdentRequest {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 1)?;
        let protocol = buf.get_u8();
        let username = get_classic_string(buf)?;
        let verify_key = get_classic_string(buf)?;
        ensure(buf, 1)?;
        buf.advance(1); // unused pad byte
        Ok(Self {
            protocol,
            username,
            verify_key,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_u8(self.protocol);
        put_classic_string(buf, &self.username);
        put_classic_string(buf, &self.verify_key);
        buf.put_u8(0);
        Ok(())
    }
}

/// Server 0x00: identification reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicIdentReply {
    pub protocol: u8,
    pub server_name: String,
    pub motd: String,
    /// 0x64 marks an op, 0x00 a regular player.
    pub user_type: u8,
}

impl ClassicIdentReply {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 1)?;
        let protocol = buf.get_u8();
        let server_name = get_classic_string(buf)?;
        let motd = get_classic_string(buf)?;
        ensure(buf, 1)?;
        let user_type = buf.get_u8();
        Ok(Self {
            protocol,
            server_name,
            motd,
            user_type,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_u8(self.protocol);
        put_classic_string(buf, &self.server_name);
        put_classic_string(buf, &self.motd);
        buf.put_u8(self.user_type);
        Ok(())
    }
}

/// Server 0x02: level transfer begins.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicLevelInit;

impl ClassicLevelInit {
    pub fn read(_buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self)
    }

    pub fn write(&self, _buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        Ok(())
    }
}

/// Server 0x03: one piece of the gzipped level, zero-padded to 1024 bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicLevelChunk {
    pub data: Bytes,
    pub percent: u8,
}

impl ClassicLevelChunk {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 2)?;
        let len = buf.get_i16() as usize;
        if len > LEVEL_CHUNK_LEN {
            return Err(ProtoError::FrameTooLarge(len));
        }
        ensure(buf, LEVEL_CHUNK_LEN + 1)?;
        let data = buf.copy_to_bytes(LEVEL_CHUNK_LEN).slice(..len);
        let percent = buf.get_u8();
        Ok(Self { data, percent })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        if self.data.len() > LEVEL_CHUNK_LEN {
            return Err(ProtoError::FrameTooLarge(self.data.len()));
        }
        buf.put_i16(self.data.len() as i16);
        buf.put_slice(&self.data);
        buf.put_bytes(0, LEVEL_CHUNK_LEN - self.data.len());
        buf.put_u8(self.percent);
        Ok(())
    }
}

/// Server 0x04: level transfer complete, carries the level dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicLevelFinalize {
    pub x_size: i16,
    pub y_size: i16,
    pub z_size: i16,
}

impl ClassicLevelFinalize {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 6)?;
        Ok(Self {
            x_size: buf.get_i16(),
            y_size: buf.get_i16(),
            z_size: buf.get_i16(),
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i16(self.x_size);
        buf.put_i16(self.y_size);
        buf.put_i16(self.z_size);
        Ok(())
    }
}

/// Server 0x01: keep the connection alive. No payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicPing;

impl ClassicPing {
    pub fn read(_buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self)
    }

    pub fn write(&self, _buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        Ok(())
    }
}

/// Client 0x05: place or destroy a block.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicSetBlock {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    /// 1 places `block`, 0 destroys whatever is there.
    pub mode: u8,
    pub block: u8,
}

impl ClassicSetBlock {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 8)?;
        Ok(Self {
            x: buf.get_i16(),
            y: buf.get_i16(),
            z: buf.get_i16(),
            mode: buf.get_u8(),
            block: buf.get_u8(),
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i16(self.x);
        buf.put_i16(self.y);
        buf.put_i16(self.z);
        buf.put_u8(self.mode);
        buf.put_u8(self.block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    const V: ProtocolVersion = ProtocolVersion::CLASSIC;

    #[test]
    fn ident_roundtrip() {
        let original = ClassicIdentRequest {
            protocol: 7,
            username: "Bob".into(),
            verify_key: "-".into(),
        };
        let mut buf = BytesMut::new();
        original.write(&mut buf, V).unwrap();
        assert_eq!(buf.len(), 1 + 64 + 64 + 1);
        let mut bytes = buf.freeze();
        assert_eq!(ClassicIdentRequest::read(&mut bytes, V).unwrap(), original);
    }

    #[test]
    fn level_chunk_pads_to_fixed_length() {
        let piece = ClassicLevelChunk {
            data: Bytes::from_static(b"abc"),
            percent: 50,
        };
        let mut buf = BytesMut::new();
        piece.write(&mut buf, V).unwrap();
        assert_eq!(buf.len(), 2 + LEVEL_CHUNK_LEN + 1);
        let mut bytes = buf.freeze();
        let back = ClassicLevelChunk::read(&mut bytes, V).unwrap();
        assert_eq!(back, piece);
    }

    #[test]
    fn level_chunk_rejects_oversized_piece() {
        let piece = ClassicLevelChunk {
            data: Bytes::from(vec![0u8; LEVEL_CHUNK_LEN + 1]),
            percent: 0,
        };
        let mut buf = BytesMut::new();
        assert!(matches!(
            piece.write(&mut buf, V),
            Err(ProtoError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn set_block_roundtrip() {
        let original = ClassicSetBlock {
            x: 10,
            y: 33,
            z: -4,
            mode: 1,
            block: 1,
        };
        let mut buf = BytesMut::new();
        original.write(&mut buf, V).unwrap();
        assert_eq!(buf.len(), 8);
        let mut bytes = buf.freeze();
        assert_eq!(ClassicSetBlock::read(&mut bytes, V).unwrap(), original);
    }
}
