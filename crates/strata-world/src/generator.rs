//! Terrain generation behind a trait so tests can swap in fixed terrain.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_proto::ChunkPos;

use crate::block;
use crate::chunk::{Chunk, CHUNK_SIZE};

pub trait ChunkGenerator: Send + Sync {
    fn generate(&self, pos: ChunkPos) -> Chunk;
}

/// Layered terrain with a gently rolling surface.
///
/// Bedrock floor, stone body, a few blocks of dirt and a grass cap whose
/// height is a deterministic function of the seed and the column, so every
/// login and every reload sees identical terrain without a stored copy.
pub struct LayeredGenerator {
    seed: i64,
}

const BASE_SURFACE: i32 = 63;

impl LayeredGenerator {
    pub fn new(seed: i64) -> Self {
        Self { seed }
    }

    fn column_height(&self, x: i32, z: i32) -> i32 {
        let mix = (self.seed as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add((x as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9))
            .wrapping_add((z as u64).wrapping_mul(0x94D0_49BB_1331_11EB));
        let mut rng = StdRng::seed_from_u64(mix);
        BASE_SURFACE + rng.gen_range(-2..=2)
    }
}

impl ChunkGenerator for LayeredGenerator {
    fn generate(&self, pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new();
        let (base_x, base_z) = pos.block_origin();
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let surface = self.column_height(base_x + x as i32, base_z + z as i32) as usize;
                chunk.set_block(x, 0, z, block::BEDROCK);
                for y in 1..surface.saturating_sub(3) {
                    chunk.set_block(x, y, z, block::STONE);
                }
                for y in surface.saturating_sub(3).max(1)..surface {
                    chunk.set_block(x, y, z, block::DIRT);
                }
                chunk.set_block(x, surface, z, block::GRASS);
            }
        }
        chunk.mark_clean();
        chunk
    }
}

/// Uniform flat terrain for tests: bedrock at zero, grass at a fixed level.
pub struct FlatGenerator {
    pub surface: usize,
}

impl ChunkGenerator for FlatGenerator {
    fn generate(&self, _pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new();
        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                chunk.set_block(x, 0, z, block::BEDROCK);
                for y in 1..self.surface {
                    chunk.set_block(x, y, z, block::DIRT);
                }
                chunk.set_block(x, self.surface, z, block::GRASS);
            }
        }
        chunk.mark_clean();
        chunk
    }
}
