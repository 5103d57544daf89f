//! Wire protocol model for every dialect strata speaks.
//!
//! One canonical packet set ([`Packet`]) covers twenty client generations
//! across two structural families: the legacy raw-TCP family (the Classic
//! dialect plus the beta/release era, id-prefixed, no length framing) and
//! the framed family (the server's native protocol, VarInt length frames
//! with ids scoped per connection state).
//!
//! Era differences of *layout* (fixed-point vs float coordinates, the three
//! string encodings, packed vs split block positions) live inside the
//! version-aware packet codecs. Era differences of *identity* (which id a
//! concept has, in which versions/states/directions it exists at all) live
//! in the [`PacketRegistry`] tables.

pub mod codec;
pub mod error;
pub mod packets;
pub mod registry;
pub mod types;
pub mod version;

pub use error::ProtoError;
pub use packets::{Packet, PacketKind};
pub use registry::{PacketRegistry, RegistryError};
pub use types::{
    player_id_from_wire, wire_entity_id, BlockFace, BlockPos, ChunkPos, ItemStack, Look, Position,
    Uuid, EYE_HEIGHT,
};
pub use version::{ConnectionState, Direction, ProtocolFamily, ProtocolVersion};
