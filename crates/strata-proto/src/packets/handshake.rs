//! Framed-family handshake and status packets.

use bytes::{Buf, BufMut};

use crate::codec::{ensure, get_string, get_varint, put_string, put_varint};
use crate::error::ProtoError;
use crate::version::{ConnectionState, ProtocolVersion};

/// First frame of every framed connection; carries the dialect number and
/// the state the client wants next (status or login).
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub protocol: i32,
    pub host: String,
    pub port: u16,
    pub next: ConnectionState,
}

impl Handshake {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        let protocol = get_varint(buf)?;
        let host = get_string(buf)?;
        ensure(buf, 2)?;
        let port = buf.get_u16();
        let next = ConnectionState::from_next_state(get_varint(buf)?)?;
        Ok(Self {
            protocol,
            host,
            port,
            next,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_varint(buf, self.protocol);
        put_string(buf, &self.host);
        buf.put_u16(self.port);
        let next = match self.next {
            ConnectionState::Status => 1,
            _ => 2,
        };
        put_varint(buf, next);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusRequest;

impl StatusRequest {
    pub fn read(_buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self)
    }

    pub fn write(&self, _buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        Ok(())
    }
}

/// Status screen JSON, built by the server crate.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub json: String,
}

impl StatusResponse {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            json: get_string(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_string(buf, &self.json);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusPing {
    pub payload: i64,
}

impl StatusPing {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 8)?;
        Ok(Self {
            payload: buf.get_i64(),
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i64(self.payload);
        Ok(())
    }
}

/// Echoes the ping payload byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPong {
    pub payload: i64,
}

impl StatusPong {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 8)?;
        Ok(Self {
            payload: buf.get_i64(),
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i64(self.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn handshake_roundtrip() {
        let handshake = Handshake {
            protocol: 47,
            host: "play.example.net".into(),
            port: 25565,
            next: ConnectionState::Login,
        };
        let mut buf = BytesMut::new();
        handshake
            .write(&mut buf, ProtocolVersion::FRAMED_47)
            .unwrap();
        let mut bytes = buf.freeze();
        let back = Handshake::read(&mut bytes, ProtocolVersion::FRAMED_47).unwrap();
        assert_eq!(back, handshake);
        assert!(bytes.is_empty());
    }

    #[test]
    fn handshake_rejects_bad_next_state() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 47);
        put_string(&mut buf, "host");
        buf.put_u16(25565);
        put_varint(&mut buf, 9);
        let mut bytes = buf.freeze();
        assert_eq!(
            Handshake::read(&mut bytes, ProtocolVersion::FRAMED_47),
            Err(ProtoError::InvalidNextState(9))
        );
    }

    #[test]
    fn ping_pong_payload_echo() {
        let mut buf = BytesMut::new();
        StatusPing { payload: -77 }
            .write(&mut buf, ProtocolVersion::FRAMED_4)
            .unwrap();
        let mut bytes = buf.freeze();
        let ping = StatusPing::read(&mut bytes, ProtocolVersion::FRAMED_4).unwrap();
        assert_eq!(ping.payload, -77);
    }
}
