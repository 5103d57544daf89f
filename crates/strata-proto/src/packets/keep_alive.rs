use bytes::{Buf, BufMut};

use crate::codec::{ensure, get_varint, put_varint};
use crate::error::ProtoError;
use crate::version::ProtocolVersion;

/// Keep-alive, both directions. Legacy dialects before 23 send it with no
/// payload; later legacy dialects carry an i32 id, framed ones a VarInt.
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAlive {
    pub id: i32,
}

impl KeepAlive {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        let id = if version.is_framed() {
            get_varint(buf)?
        } else if version.keep_alive_has_id() {
            ensure(buf, 4)?;
            buf.get_i32()
        } else {
            0
        };
        Ok(Self { id })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        if version.is_framed() {
            put_varint(buf, self.id);
        } else if version.keep_alive_has_id() {
            buf.put_i32(self.id);
        }
        Ok(())
    }
}
