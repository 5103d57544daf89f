//! Block ids, shared verbatim by every era this server speaks.

pub const AIR: u8 = 0;
pub const STONE: u8 = 1;
pub const GRASS: u8 = 2;
pub const DIRT: u8 = 3;
pub const PLANKS: u8 = 5;
pub const BEDROCK: u8 = 7;
pub const WATER: u8 = 9;
pub const LAVA: u8 = 11;
pub const SAND: u8 = 12;
pub const GLASS: u8 = 20;

/// Whether a body collides with this block.
pub fn is_solid(id: u8) -> bool {
    !matches!(id, AIR | WATER | LAVA)
}
