//! Framed-family login sequence and the join packet.
//!
//! LoginStart → EncryptionRequest → EncryptionResponse → LoginSuccess, with
//! the stream ciphers installed between response and success.

use bytes::{Buf, BufMut};

use crate::codec::{
    ensure, get_byte_array, get_string, json_text, json_text_unwrap, put_byte_array, put_string,
};
use crate::error::ProtoError;
use crate::types::Uuid;
use crate::version::ProtocolVersion;

#[derive(Debug, Clone, PartialEq)]
pub struct LoginStart {
    pub username: String,
}

impl LoginStart {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            username: get_string(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_string(buf, &self.username);
        Ok(())
    }
}

/// Fresh per-connection public key plus a random verify token.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionRequest {
    pub server_id: String,
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl EncryptionRequest {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            server_id: get_string(buf)?,
            public_key: get_byte_array(buf)?,
            verify_token: get_byte_array(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_string(buf, &self.server_id);
        put_byte_array(buf, &self.public_key);
        put_byte_array(buf, &self.verify_token);
        Ok(())
    }
}

/// Both fields arrive encrypted to the server's public key.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionResponse {
    pub shared_secret: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl EncryptionResponse {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            shared_secret: get_byte_array(buf)?,
            verify_token: get_byte_array(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_byte_array(buf, &self.shared_secret);
        put_byte_array(buf, &self.verify_token);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
}

impl LoginSuccess {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            uuid: Uuid::parse(&get_string(buf)?)?,
            username: get_string(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_string(buf, &self.uuid.to_string());
        put_string(buf, &self.username);
        Ok(())
    }
}

/// Login-state disconnect; the reason travels as a chat component.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginDisconnect {
    pub reason: String,
}

impl LoginDisconnect {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        Ok(Self {
            reason: json_text_unwrap(&get_string(buf)?),
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        put_string(buf, &json_text(&self.reason));
        Ok(())
    }
}

/// First Play-state packet of a framed session.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinGame {
    pub entity_id: i32,
    pub gamemode: u8,
    pub dimension: i8,
    pub difficulty: u8,
    pub max_players: u8,
    pub level_type: String,
}

impl JoinGame {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 8)?;
        let entity_id = buf.get_i32();
        let gamemode = buf.get_u8();
        let dimension = buf.get_i8();
        let difficulty = buf.get_u8();
        let max_players = buf.get_u8();
        let level_type = get_string(buf)?;
        if version.at_least(ProtocolVersion::FRAMED_47) {
            ensure(buf, 1)?;
            buf.get_u8(); // reduced debug info
        }
        Ok(Self {
            entity_id,
            gamemode,
            dimension,
            difficulty,
            max_players,
            level_type,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i32(self.entity_id);
        buf.put_u8(self.gamemode);
        buf.put_i8(self.dimension);
        buf.put_u8(self.difficulty);
        buf.put_u8(self.max_players);
        put_string(buf, &self.level_type);
        if version.at_least(ProtocolVersion::FRAMED_47) {
            buf.put_u8(0);
        }
        Ok(())
    }
}
