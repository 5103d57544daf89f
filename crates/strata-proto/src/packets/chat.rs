use bytes::{Buf, BufMut};

use crate::codec::{
    ensure, get_classic_string, get_string, get_string16, json_text, json_text_unwrap,
    put_classic_string, put_string, put_string16,
};
use crate::error::ProtoError;
use crate::version::ProtocolVersion;

/// Chat message, both directions. The canonical form is always the plain
/// text; framed clientbound wraps it in a JSON text component, classic
/// prefixes a player id byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub message: String,
}

impl Chat {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        let message = if version.is_classic() {
            ensure(buf, 1)?;
            buf.advance(1); // sender id, unused serverbound
            get_classic_string(buf)?
        } else if version.is_framed() {
            get_string(buf)?
        } else {
            get_string16(buf)?
        };
        Ok(Self { message })
    }

    /// Clientbound JSON form, framed dialects only. 47 appends the chat
    /// position byte.
    pub fn read_json(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        let message = json_text_unwrap(&get_string(buf)?);
        if version.at_least(ProtocolVersion::FRAMED_47) {
            ensure(buf, 1)?;
            buf.advance(1);
        }
        Ok(Self { message })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_classic() {
            buf.put_u8(0);
            put_classic_string(buf, &self.message);
        } else if version.is_framed() {
            put_string(buf, &self.message);
        } else {
            put_string16(buf, &self.message);
        }
        Ok(())
    }

    pub fn write_json(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        put_string(buf, &json_text(&self.message));
        if version.at_least(ProtocolVersion::FRAMED_47) {
            buf.put_i8(0); // chat box position
        }
        Ok(())
    }
}
