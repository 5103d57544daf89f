use bytes::{Buf, BufMut};

use crate::codec::ensure;
use crate::error::ProtoError;
use crate::types::ItemStack;
use crate::version::ProtocolVersion;

/// Clientbound: overwrite one inventory slot. Window 0 is the player
/// inventory; slot indices are shared by every dialect that has this
/// packet.
#[derive(Debug, Clone, PartialEq)]
pub struct SetSlot {
    pub window_id: i8,
    pub slot: i16,
    pub item: Option<ItemStack>,
}

impl SetSlot {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 3)?;
        Ok(Self {
            window_id: buf.get_i8(),
            slot: buf.get_i16(),
            item: ItemStack::read_opt(buf, version)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i8(self.window_id);
        buf.put_i16(self.slot);
        ItemStack::write_opt(self.item.as_ref(), buf, version);
        Ok(())
    }
}

/// Serverbound: creative-mode slot overwrite straight from the client.
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeSlot {
    pub slot: i16,
    pub item: Option<ItemStack>,
}

impl CreativeSlot {
    pub fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 2)?;
        Ok(Self {
            slot: buf.get_i16(),
            item: ItemStack::read_opt(buf, version)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i16(self.slot);
        ItemStack::write_opt(self.item.as_ref(), buf, version);
        Ok(())
    }
}

/// Serverbound: hotbar selection changed.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldItemChange {
    pub slot: i16,
}

impl HeldItemChange {
    pub fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self, ProtoError> {
        ensure(buf, 2)?;
        Ok(Self {
            slot: buf.get_i16(),
        })
    }

    pub fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) -> Result<(), ProtoError> {
        buf.put_i16(self.slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn set_slot_roundtrip() {
        let original = SetSlot {
            window_id: 0,
            slot: 36,
            item: Some(ItemStack {
                id: 3,
                count: 64,
                damage: 0,
            }),
        };
        for version in [
            ProtocolVersion::legacy(14),
            ProtocolVersion::legacy(61),
            ProtocolVersion::FRAMED_47,
        ] {
            let mut buf = BytesMut::new();
            original.write(&mut buf, version).unwrap();
            let mut bytes = buf.freeze();
            assert_eq!(SetSlot::read(&mut bytes, version).unwrap(), original, "{version}");
        }
    }

    #[test]
    fn set_slot_empty_is_bare_sentinel() {
        let cleared = SetSlot {
            window_id: 0,
            slot: 36,
            item: None,
        };
        let mut buf = BytesMut::new();
        cleared.write(&mut buf, ProtocolVersion::legacy(14)).unwrap();
        assert_eq!(&buf[..], &[0, 0, 36, 0xFF, 0xFF]);
    }

    #[test]
    fn creative_slot_roundtrip() {
        let original = CreativeSlot {
            slot: 40,
            item: Some(ItemStack {
                id: 276,
                count: 1,
                damage: 100,
            }),
        };
        for version in [ProtocolVersion::legacy(29), ProtocolVersion::FRAMED_4] {
            let mut buf = BytesMut::new();
            original.write(&mut buf, version).unwrap();
            let mut bytes = buf.freeze();
            assert_eq!(
                CreativeSlot::read(&mut bytes, version).unwrap(),
                original,
                "{version}"
            );
        }
    }

    #[test]
    fn held_item_roundtrip() {
        let original = HeldItemChange { slot: 3 };
        let mut buf = BytesMut::new();
        original.write(&mut buf, ProtocolVersion::FRAMED_47).unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(
            HeldItemChange::read(&mut bytes, ProtocolVersion::FRAMED_47).unwrap(),
            original
        );
    }
}
