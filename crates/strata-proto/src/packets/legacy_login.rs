//! Legacy-family (beta/release era) handshake and login packets.
//!
//! The dialect number is discovered *inside* these packets, so their readers
//! self-describe instead of trusting the provisional version the handler
//! decodes with: the handshake sniffs its first payload byte (a string16
//! length high byte is always zero, a release-era protocol number never is)
//! and the login request branches on its own version field.

use bytes::{Buf, BufMut};

use crate::codec::{ensure, get_string16, put_string16};
use crate::error::ProtoError;
use crate::version::ProtocolVersion;

/// Client's opening packet, id 0x02.
///
/// Beta form is a single string16, either a bare username or
/// `user;host:port`. From legacy 39 the layout is protocol byte + username
/// + host + port.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyHandshakeRequest {
    /// Dialect number when the handshake carries one, -1 until the login
    /// packet reveals it.
    pub protocol: i32,
    pub username: String,
    pub host: String,
    pub port: i32,
}

impl LegacyHandshakeRequest {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 1)?;
        if buf.chunk()[0] == 0 {
            // Beta layout: one string16.
            let raw = get_string16(buf)?;
            let (username, rest) = match raw.split_once(';') {
                Some((user, rest)) => (user.to_string(), rest),
                None => (raw.clone(), ""),
            };
            let (host, port) = match rest.split_once(':') {
                Some((host, port)) => (host.to_string(), port.parse().unwrap_or(0)),
                None => (rest.to_string(), 0),
            };
            Ok(Self {
                protocol: -1,
                username,
                host,
                port,
            })
        } else {
            let protocol = buf.get_u8() as i32;
            let username = get_string16(buf)?;
            let host = get_string16(buf)?;
            ensure(buf, 4)?;
            let port = buf.get_i32();
            Ok(Self {
                protocol,
                username,
                host,
                port,
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.at_least(ProtocolVersion::LEGACY_39) {
            buf.put_u8(self.protocol as u8);
            put_string16(buf, &self.username);
            put_string16(buf, &self.host);
            buf.put_i32(self.port);
        } else if self.host.is_empty() {
            put_string16(buf, &self.username);
        } else {
            put_string16(buf, &format!("{};{}:{}", self.username, self.host, self.port));
        }
        Ok(())
    }
}

/// Server's 0x02 reply: a connection hash, `-` for unauthenticated mode.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyHandshakeReply {
    pub hash: String,
}

impl LegacyHandshakeReply {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            hash: get_string16(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_string16(buf, &self.hash);
        Ok(())
    }
}

/// Client's 0x01 login. The version field always comes first; the rest of
/// the layout follows the era that version belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLoginRequest {
    pub version: i32,
    pub username: String,
}

impl LegacyLoginRequest {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 4)?;
        let version = buf.get_i32();
        let username = get_string16(buf)?;
        if version >= ProtocolVersion::LEGACY_23.number {
            // level type, mode, dimension, difficulty, height, max players
            get_string16(buf)?;
            ensure(buf, 11)?;
            buf.advance(11);
        } else {
            // map seed, dimension
            ensure(buf, 9)?;
            buf.advance(9);
        }
        Ok(Self { version, username })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i32(self.version);
        put_string16(buf, &self.username);
        if self.version >= ProtocolVersion::LEGACY_23.number {
            put_string16(buf, "default");
            buf.put_i32(0); // mode
            buf.put_i32(0); // dimension
            buf.put_i8(1); // difficulty
            buf.put_u8(128); // world height
            buf.put_u8(20); // max players
        } else {
            buf.put_i64(0); // map seed
            buf.put_i8(0); // dimension
        }
        Ok(())
    }
}

/// Server's 0x01 reply accepting the login.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLoginReply {
    pub entity_id: i32,
    pub seed: i64,
    pub level_type: String,
    pub gamemode: i32,
    pub dimension: i32,
    pub difficulty: i8,
    pub world_height: u8,
    pub max_players: u8,
}

impl LegacyLoginReply {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 4)?;
        let entity_id = buf.get_i32();
        if version.at_least(ProtocolVersion::LEGACY_23) {
            let level_type = get_string16(buf)?;
            ensure(buf, 11)?;
            let gamemode = buf.get_i32();
            let dimension = buf.get_i32();
            let difficulty = buf.get_i8();
            let world_height = buf.get_u8();
            let max_players = buf.get_u8();
            Ok(Self {
                entity_id,
                seed: 0,
                level_type,
                gamemode,
                dimension,
                difficulty,
                world_height,
                max_players,
            })
        } else {
            get_string16(buf)?;
            ensure(buf, 9)?;
            let seed = buf.get_i64();
            let dimension = buf.get_i8() as i32;
            Ok(Self {
                entity_id,
                seed,
                level_type: String::new(),
                gamemode: 0,
                dimension,
                difficulty: 1,
                world_height: 128,
                max_players: 20,
            })
        }
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i32(self.entity_id);
        if version.at_least(ProtocolVersion::LEGACY_23) {
            put_string16(buf, &self.level_type);
            buf.put_i32(self.gamemode);
            buf.put_i32(self.dimension);
            buf.put_i8(self.difficulty);
            buf.put_u8(self.world_height);
            buf.put_u8(self.max_players);
        } else {
            put_string16(buf, "");
            buf.put_i64(self.seed);
            buf.put_i8(self.dimension as i8);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    const PROVISIONAL: ProtocolVersion = ProtocolVersion::LEGACY_7;

    #[test]
    fn beta_handshake_bare_username() {
        let mut buf = BytesMut::new();
        put_string16(&mut buf, "Bob");
        let mut bytes = buf.freeze();
        let handshake = LegacyHandshakeRequest::read(&mut bytes, PROVISIONAL).unwrap();
        assert_eq!(handshake.username, "Bob");
        assert_eq!(handshake.protocol, -1);
    }

    #[test]
    fn beta_handshake_with_host() {
        let mut buf = BytesMut::new();
        put_string16(&mut buf, "Bob;mc.example.net:25565");
        let mut bytes = buf.freeze();
        let handshake = LegacyHandshakeRequest::read(&mut bytes, PROVISIONAL).unwrap();
        assert_eq!(handshake.username, "Bob");
        assert_eq!(handshake.host, "mc.example.net");
        assert_eq!(handshake.port, 25565);
    }

    #[test]
    fn release_handshake_sniffed_by_protocol_byte() {
        let original = LegacyHandshakeRequest {
            protocol: 61,
            username: "Bob".into(),
            host: "mc.example.net".into(),
            port: 25565,
        };
        let mut buf = BytesMut::new();
        original
            .write(&mut buf, ProtocolVersion::legacy(61))
            .unwrap();
        // The provisional decode version is still the beta one.
        let mut bytes = buf.freeze();
        let handshake = LegacyHandshakeRequest::read(&mut bytes, PROVISIONAL).unwrap();
        assert_eq!(handshake, original);
    }

    #[test]
    fn login_request_branches_on_own_version() {
        for version in [14, 29, 61] {
            let original = LegacyLoginRequest {
                version,
                username: "Bob".into(),
            };
            let mut buf = BytesMut::new();
            original.write(&mut buf, PROVISIONAL).unwrap();
            let mut bytes = buf.freeze();
            let back = LegacyLoginRequest::read(&mut bytes, PROVISIONAL).unwrap();
            assert_eq!(back, original);
            assert!(bytes.is_empty(), "version {version} left bytes behind");
        }
    }

    #[test]
    fn login_reply_era_layouts() {
        let reply = LegacyLoginReply {
            entity_id: 8,
            seed: 42,
            level_type: "default".into(),
            gamemode: 0,
            dimension: 0,
            difficulty: 1,
            world_height: 128,
            max_players: 20,
        };
        let mut beta = BytesMut::new();
        reply.write(&mut beta, ProtocolVersion::legacy(14)).unwrap();
        let mut bytes = beta.freeze();
        let back = LegacyLoginReply::read(&mut bytes, ProtocolVersion::legacy(14)).unwrap();
        assert_eq!(back.entity_id, 8);
        assert_eq!(back.seed, 42);

        let mut release = BytesMut::new();
        reply
            .write(&mut release, ProtocolVersion::legacy(51))
            .unwrap();
        let mut bytes = release.freeze();
        let back = LegacyLoginReply::read(&mut bytes, ProtocolVersion::legacy(51)).unwrap();
        assert_eq!(back.level_type, "default");
        assert_eq!(back.world_height, 128);
    }
}
