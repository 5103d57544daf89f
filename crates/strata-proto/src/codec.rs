//! Byte-cursor primitives shared by every packet codec.
//!
//! Three string encodings coexist across the supported eras: VarInt-length
//! UTF-8 (framed family), i16-length UTF-16BE "string16" (beta/release
//! legacy), and 64-byte space-padded ASCII (Classic). Entity positions in
//! every pre-float era travel as fixed-point thirty-seconds of a block;
//! rotations as 256-step angle bytes.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;
use crate::types::BlockPos;

/// Longest string the framed family accepts, in bytes.
pub const MAX_STRING_LEN: usize = 32_767;

/// Longest string16 the legacy family accepts, in UTF-16 units.
pub const MAX_STRING16_LEN: usize = 1_024;

/// Classic strings are always exactly this many bytes, space padded.
pub const CLASSIC_STRING_LEN: usize = 64;

/// Largest length-prefixed byte array the framed login accepts.
pub const MAX_BYTE_ARRAY_LEN: usize = 65_536;

/// Fail with [`ProtoError::BufferTooShort`] unless `needed` bytes remain.
pub fn ensure(buf: &impl Buf, needed: usize) -> Result<(), ProtoError> {
    let remaining = buf.remaining();
    if remaining < needed {
        Err(ProtoError::BufferTooShort {
            needed: needed - remaining,
            remaining,
        })
    } else {
        Ok(())
    }
}

// ─── VarInt (framed family) ─────────────────────────────────────────────────

/// Write a two's-complement i32 as a 7-bit-group VarInt (1–5 bytes).
pub fn put_varint(buf: &mut impl BufMut, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            buf.put_u8(v as u8);
            return;
        }
        buf.put_u8((v & 0x7F) as u8 | 0x80);
        v >>= 7;
    }
}

pub fn get_varint(buf: &mut impl Buf) -> Result<i32, ProtoError> {
    let mut value: u32 = 0;
    for shift in 0u32..5 {
        ensure(buf, 1)?;
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u32) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtoError::VarIntTooLong)
}

/// Encoded size of a VarInt without writing it.
pub fn varint_len(value: i32) -> usize {
    let v = value as u32;
    match v {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x001F_FFFF => 3,
        0x0020_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

// ─── Strings ────────────────────────────────────────────────────────────────

/// VarInt byte length + UTF-8, the framed family's string.
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    put_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

pub fn get_string(buf: &mut impl Buf) -> Result<String, ProtoError> {
    let length = get_varint(buf)?;
    if length < 0 || length as usize > MAX_STRING_LEN {
        return Err(ProtoError::StringTooLong {
            length: length as i64,
            max: MAX_STRING_LEN,
        });
    }
    let length = length as usize;
    ensure(buf, length)?;
    let mut raw = vec![0u8; length];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| ProtoError::InvalidUtf8)
}

/// i16 unit count + UTF-16BE, the beta/release legacy string.
pub fn put_string16(buf: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    buf.put_i16(units.len() as i16);
    for unit in units {
        buf.put_u16(unit);
    }
}

pub fn get_string16(buf: &mut impl Buf) -> Result<String, ProtoError> {
    ensure(buf, 2)?;
    let length = buf.get_i16();
    if length < 0 || length as usize > MAX_STRING16_LEN {
        return Err(ProtoError::StringTooLong {
            length: length as i64,
            max: MAX_STRING16_LEN,
        });
    }
    let length = length as usize;
    ensure(buf, length * 2)?;
    let mut units = Vec::with_capacity(length);
    for _ in 0..length {
        units.push(buf.get_u16());
    }
    String::from_utf16(&units).map_err(|_| ProtoError::InvalidUtf16)
}

/// Fixed 64 bytes, space padded, non-ASCII replaced. The Classic string.
pub fn put_classic_string(buf: &mut impl BufMut, s: &str) {
    let mut raw = [b' '; CLASSIC_STRING_LEN];
    for (slot, ch) in raw.iter_mut().zip(s.chars()) {
        *slot = if ch.is_ascii() { ch as u8 } else { b'?' };
    }
    buf.put_slice(&raw);
}

pub fn get_classic_string(buf: &mut impl Buf) -> Result<String, ProtoError> {
    ensure(buf, CLASSIC_STRING_LEN)?;
    let mut raw = [0u8; CLASSIC_STRING_LEN];
    buf.copy_to_slice(&mut raw);
    let end = raw.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    Ok(raw[..end].iter().map(|&b| b as char).collect())
}

// ─── Byte arrays (framed login) ─────────────────────────────────────────────

pub fn put_byte_array(buf: &mut impl BufMut, bytes: &[u8]) {
    put_varint(buf, bytes.len() as i32);
    buf.put_slice(bytes);
}

pub fn get_byte_array(buf: &mut impl Buf) -> Result<Vec<u8>, ProtoError> {
    let length = get_varint(buf)?;
    if length < 0 || length as usize > MAX_BYTE_ARRAY_LEN {
        return Err(ProtoError::StringTooLong {
            length: length as i64,
            max: MAX_BYTE_ARRAY_LEN,
        });
    }
    let length = length as usize;
    ensure(buf, length)?;
    let mut raw = vec![0u8; length];
    buf.copy_to_slice(&mut raw);
    Ok(raw)
}

// ─── Chat-component JSON ────────────────────────────────────────────────────

/// Wrap plain text in the framed family's minimal chat component.
pub fn json_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 12);
    for ch in text.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            c if (c as u32) < 0x20 => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push(c),
        }
    }
    format!("{{\"text\":\"{escaped}\"}}")
}

/// Inverse of [`json_text`] for components this server wrote itself;
/// anything else is returned verbatim.
pub fn json_text_unwrap(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix("{\"text\":\"")
        .and_then(|s| s.strip_suffix("\"}"))
    else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => return raw.to_string(),
                }
            }
            Some(c) => out.push(c),
            None => return raw.to_string(),
        }
    }
    out
}

// ─── Fixed-point coordinates and angle bytes ────────────────────────────────

/// Block units → fixed-point thirty-seconds (i32 entity positions,
/// legacy and framed pre-float eras).
pub fn to_fixed32(v: f64) -> i32 {
    (v * 32.0).floor() as i32
}

pub fn from_fixed32(v: i32) -> f64 {
    v as f64 / 32.0
}

/// Block units → fixed-point thirty-seconds in i16 (Classic positions).
pub fn to_fixed32_i16(v: f64) -> i16 {
    (v * 32.0).floor() as i16
}

pub fn from_fixed32_i16(v: i16) -> f64 {
    v as f64 / 32.0
}

/// Degrees → 256-step angle byte.
pub fn to_angle_byte(degrees: f32) -> u8 {
    (degrees * 256.0 / 360.0).rem_euclid(256.0) as u8
}

pub fn from_angle_byte(b: u8) -> f32 {
    b as f32 * 360.0 / 256.0
}

// ─── Packed block positions ─────────────────────────────────────────────────

/// x:26 y:12 z:26 bit-packed block position, newest framed dialect only.
pub fn put_block_pos_packed(buf: &mut impl BufMut, pos: BlockPos) {
    let v = ((pos.x as i64 & 0x3FF_FFFF) << 38)
        | ((pos.y as i64 & 0xFFF) << 26)
        | (pos.z as i64 & 0x3FF_FFFF);
    buf.put_i64(v);
}

pub fn get_block_pos_packed(buf: &mut impl Buf) -> Result<BlockPos, ProtoError> {
    ensure(buf, 8)?;
    let v = buf.get_i64();
    Ok(BlockPos {
        x: (v >> 38) as i32,
        y: (v << 26 >> 52) as i32,
        z: (v << 38 >> 38) as i32,
    })
}
