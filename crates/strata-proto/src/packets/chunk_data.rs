//! Column transfer packets. The canonical payload is the bare block array
//! in x-z-y order, 16x16 footprint, column height inferred from its length;
//! lighting and metadata planes exist only on the wire and are synthesized
//! during encode.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::codec::{ensure, get_varint, put_varint};
use crate::error::ProtoError;
use crate::types::ChunkPos;
use crate::version::ProtocolVersion;

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, ProtoError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ProtoError::ChunkPayload(e.to_string()))
}

fn zlib_decompress(data: &[u8], expected: usize) -> Result<Vec<u8>, ProtoError> {
    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| ProtoError::ChunkPayload(e.to_string()))?;
    Ok(out)
}

/// Clientbound full-column data.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    pub pos: ChunkPos,
    /// Block ids, `(x * 16 + z) * height + y` order, `16 * 16 * height` long.
    pub blocks: Bytes,
}

impl ChunkData {
    fn height(&self) -> Result<usize, ProtoError> {
        let len = self.blocks.len();
        if len == 0 || len % 256 != 0 || len / 256 > 256 {
            return Err(ProtoError::ChunkPayload(format!(
                "block array length {len} is not a 16x16 column"
            )));
        }
        Ok(len / 256)
    }

    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        if version.is_framed() {
            ensure(buf, 11)?;
            let pos = ChunkPos::new(buf.get_i32(), buf.get_i32());
            buf.advance(1); // full-column flag, always set
            let mask = buf.get_u16();
            let len = get_varint(buf)? as usize;
            ensure(buf, len)?;
            let compressed = buf.copy_to_bytes(len);
            let blocks = if mask == 0 {
                Bytes::new()
            } else {
                Bytes::from(zlib_decompress(&compressed, 16 * 16 * 128)?)
            };
            Ok(Self { pos, blocks })
        } else {
            ensure(buf, 17)?;
            let x = buf.get_i32();
            let _y = buf.get_i16();
            let z = buf.get_i32();
            buf.advance(2); // x and z extents, always 15
            let height = buf.get_u8() as usize + 1;
            let len = buf.get_i32() as usize;
            ensure(buf, len)?;
            let compressed = buf.copy_to_bytes(len);
            let raw = zlib_decompress(&compressed, height * 640)?;
            let block_len = height * 256;
            if raw.len() < block_len {
                return Err(ProtoError::ChunkPayload(format!(
                    "decompressed column is {} bytes, wanted at least {block_len}",
                    raw.len()
                )));
            }
            Ok(Self {
                pos: ChunkPos::new(x >> 4, z >> 4),
                blocks: Bytes::from(raw[..block_len].to_vec()),
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        let height = self.height()?;
        if version.is_framed() {
            let compressed = zlib_compress(&self.blocks)?;
            buf.put_i32(self.pos.x);
            buf.put_i32(self.pos.z);
            buf.put_u8(1);
            buf.put_u16(0xFFFF);
            put_varint(buf, compressed.len() as i32);
            buf.put_slice(&compressed);
            Ok(())
        } else if version.is_classic() {
            Err(ProtoError::UnsupportedVersion(version))
        } else {
            // Wire planes after the blocks: metadata, block light, sky light,
            // each one nibble per block.
            let half = self.blocks.len() / 2;
            let mut raw = Vec::with_capacity(self.blocks.len() + half * 3);
            raw.extend_from_slice(&self.blocks);
            raw.resize(self.blocks.len() + half * 2, 0x00);
            raw.resize(self.blocks.len() + half * 3, 0xFF);
            let compressed = zlib_compress(&raw)?;
            let origin = self.pos.block_origin();
            buf.put_i32(origin.0);
            buf.put_i16(0);
            buf.put_i32(origin.1);
            buf.put_u8(15);
            buf.put_u8(height as u8 - 1);
            buf.put_u8(15);
            buf.put_i32(compressed.len() as i32);
            buf.put_slice(&compressed);
            Ok(())
        }
    }
}

/// Legacy-only column bookkeeping: mode 1 announces a column, mode 0
/// releases it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreChunk {
    pub pos: ChunkPos,
    pub load: bool,
}

impl PreChunk {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 9)?;
        Ok(Self {
            pos: ChunkPos::new(buf.get_i32(), buf.get_i32()),
            load: buf.get_u8() != 0,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i32(self.pos.x);
        buf.put_i32(self.pos.z);
        buf.put_u8(self.load as u8);
        Ok(())
    }
}

/// Framed-only column release: the column header with an empty section mask.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkUnload {
    pub pos: ChunkPos,
}

impl ChunkUnload {
    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if !version.is_framed() {
            return Err(ProtoError::UnsupportedVersion(version));
        }
        buf.put_i32(self.pos.x);
        buf.put_i32(self.pos.z);
        buf.put_u8(1);
        buf.put_u16(0);
        put_varint(buf, 0);
        Ok(())
    }
}
