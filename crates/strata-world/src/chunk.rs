//! One 16x16 column of blocks, full world height.

use crate::block;

pub const CHUNK_SIZE: usize = 16;
pub const WORLD_HEIGHT: usize = 128;
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * WORLD_HEIGHT;

/// Flat block array in x-z-y order plus a dirty flag for the save pass.
///
/// The array layout is exactly the canonical wire layout, so a column can
/// be snapshotted for transfer with a plain copy.
pub struct Chunk {
    blocks: Box<[u8; CHUNK_VOLUME]>,
    dirty: bool,
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            blocks: Box::new([block::AIR; CHUNK_VOLUME]),
            dirty: false,
        }
    }

    /// Rebuild from a raw block array, e.g. out of the store. Returns
    /// `None` when the array is not one full column.
    pub fn from_raw(raw: &[u8]) -> Option<Self> {
        let blocks: Box<[u8; CHUNK_VOLUME]> = raw.to_vec().into_boxed_slice().try_into().ok()?;
        Some(Self {
            blocks,
            dirty: false,
        })
    }

    fn index(x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < CHUNK_SIZE && y < WORLD_HEIGHT && z < CHUNK_SIZE);
        (x * CHUNK_SIZE + z) * WORLD_HEIGHT + y
    }

    pub fn block(&self, x: usize, y: usize, z: usize) -> u8 {
        self.blocks[Self::index(x, y, z)]
    }

    /// Returns true when the block actually changed.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, id: u8) -> bool {
        let slot = &mut self.blocks[Self::index(x, y, z)];
        if *slot == id {
            return false;
        }
        *slot = id;
        self.dirty = true;
        true
    }

    /// Highest solid block in a column, if any.
    pub fn surface_y(&self, x: usize, z: usize) -> Option<usize> {
        (0..WORLD_HEIGHT).rev().find(|&y| block::is_solid(self.block(x, y, z)))
    }

    pub fn raw(&self) -> &[u8] {
        &self.blocks[..]
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
