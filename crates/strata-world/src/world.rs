//! The shared world: a concurrent chunk cache in front of a store and a
//! generator.
//!
//! Every accessor takes `&self`. Connection tasks and the tick loop all
//! hold the same `Arc<World>` and go through [`dashmap`] for interior
//! mutability, so a block edit never blocks an unrelated column.

use dashmap::DashMap;
use tracing::warn;

use strata_proto::{BlockPos, ChunkPos};

use crate::block;
use crate::chunk::{Chunk, CHUNK_SIZE, WORLD_HEIGHT};
use crate::generator::ChunkGenerator;
use crate::store::ChunkStore;
use crate::WorldError;

pub struct World {
    chunks: DashMap<ChunkPos, Chunk>,
    store: Box<dyn ChunkStore>,
    generator: Box<dyn ChunkGenerator>,
    seed: i64,
}

fn local(v: i32) -> usize {
    v.rem_euclid(CHUNK_SIZE as i32) as usize
}

impl World {
    pub fn new(
        store: Box<dyn ChunkStore>,
        generator: Box<dyn ChunkGenerator>,
        seed: i64,
    ) -> Self {
        Self {
            chunks: DashMap::new(),
            store,
            generator,
            seed,
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn loaded_count(&self) -> usize {
        self.chunks.len()
    }

    /// Makes the column resident: loads it from the store, or generates it
    /// when the store has nothing usable. A load error is logged and the
    /// column regenerated rather than poisoning the world.
    pub fn ensure_chunk(&self, pos: ChunkPos) {
        if self.chunks.contains_key(&pos) {
            return;
        }
        let chunk = match self.store.load(pos) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => self.generator.generate(pos),
            Err(err) => {
                warn!(?pos, %err, "chunk load failed, regenerating");
                self.generator.generate(pos)
            }
        };
        // Two tasks may race here; the first insert wins and the loser's
        // copy is dropped, which is safe because neither has been edited.
        self.chunks.entry(pos).or_insert(chunk);
    }

    /// Copy of the column's raw block array, loading it first if needed.
    pub fn snapshot(&self, pos: ChunkPos) -> Vec<u8> {
        self.ensure_chunk(pos);
        match self.chunks.get(&pos) {
            Some(chunk) => chunk.raw().to_vec(),
            None => self.generator.generate(pos).raw().to_vec(),
        }
    }

    /// Block id at `pos`. Out-of-range heights and columns that are not
    /// resident read as air; reading never loads anything.
    pub fn block(&self, pos: BlockPos) -> u8 {
        if pos.y < 0 || pos.y >= WORLD_HEIGHT as i32 {
            return block::AIR;
        }
        match self.chunks.get(&pos.chunk_pos()) {
            Some(chunk) => chunk.block(local(pos.x), pos.y as usize, local(pos.z)),
            None => block::AIR,
        }
    }

    /// Writes a block, loading the column if needed. Returns whether the
    /// stored id actually changed.
    pub fn set_block(&self, pos: BlockPos, id: u8) -> bool {
        if pos.y < 0 || pos.y >= WORLD_HEIGHT as i32 {
            return false;
        }
        let chunk_pos = pos.chunk_pos();
        self.ensure_chunk(chunk_pos);
        match self.chunks.get_mut(&chunk_pos) {
            Some(mut chunk) => chunk.set_block(local(pos.x), pos.y as usize, local(pos.z), id),
            None => false,
        }
    }

    /// Height of the topmost solid block in the column, loading it if
    /// needed. An all-air column reports zero.
    pub fn surface_y(&self, x: i32, z: i32) -> i32 {
        let pos = BlockPos::new(x, 0, z).chunk_pos();
        self.ensure_chunk(pos);
        self.chunks
            .get(&pos)
            .and_then(|chunk| chunk.surface_y(local(x), local(z)))
            .map(|y| y as i32)
            .unwrap_or(0)
    }

    /// Drops the column from the cache, writing it out first when it has
    /// unsaved edits.
    pub fn evict(&self, pos: ChunkPos) -> Result<(), WorldError> {
        if let Some((_, chunk)) = self.chunks.remove(&pos) {
            if chunk.is_dirty() {
                self.store.save(pos, &chunk)?;
            }
        }
        Ok(())
    }

    /// Writes every dirty resident column to the store. Returns how many
    /// were saved.
    pub fn flush_dirty(&self) -> Result<usize, WorldError> {
        let mut saved = 0;
        for mut entry in self.chunks.iter_mut() {
            if entry.is_dirty() {
                let pos = *entry.key();
                self.store.save(pos, entry.value())?;
                entry.mark_clean();
                saved += 1;
            }
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatGenerator;
    use crate::store::MemoryStore;

    fn flat_world() -> World {
        World::new(
            Box::new(MemoryStore::new()),
            Box::new(FlatGenerator { surface: 60 }),
            0,
        )
    }

    #[test]
    fn set_then_read_block() {
        let world = flat_world();
        let pos = BlockPos::new(20, 61, -5);
        assert!(world.set_block(pos, block::STONE));
        assert_eq!(world.block(pos), block::STONE);
        // Writing the same id again is a no-op.
        assert!(!world.set_block(pos, block::STONE));
    }

    #[test]
    fn out_of_range_reads_are_air_and_load_nothing() {
        let world = flat_world();
        assert_eq!(world.block(BlockPos::new(0, -1, 0)), block::AIR);
        assert_eq!(world.block(BlockPos::new(0, 200, 0)), block::AIR);
        assert_eq!(world.block(BlockPos::new(0, 64, 0)), block::AIR);
        assert_eq!(world.loaded_count(), 0);
    }

    #[test]
    fn eviction_persists_edits() {
        let world = flat_world();
        let pos = BlockPos::new(3, 61, 3);
        world.set_block(pos, block::SAND);

        world.evict(pos.chunk_pos()).unwrap();
        assert_eq!(world.loaded_count(), 0);

        // Reload goes through the store, not the generator.
        assert_eq!(world.surface_y(3, 3), 61);
        assert_eq!(world.block(pos), block::SAND);
    }

    #[test]
    fn evicting_a_clean_chunk_skips_the_store() {
        let world = flat_world();
        world.ensure_chunk(ChunkPos::new(0, 0));
        world.evict(ChunkPos::new(0, 0)).unwrap();
        world.ensure_chunk(ChunkPos::new(0, 0));
        // The flat generator leaves chunks clean, so nothing was saved and
        // the column came back from the generator unchanged.
        assert_eq!(world.surface_y(0, 0), 60);
    }

    #[test]
    fn flush_counts_only_dirty_chunks() {
        let world = flat_world();
        world.ensure_chunk(ChunkPos::new(0, 0));
        world.ensure_chunk(ChunkPos::new(1, 0));
        world.set_block(BlockPos::new(0, 61, 0), block::STONE);

        assert_eq!(world.flush_dirty().unwrap(), 1);
        assert_eq!(world.flush_dirty().unwrap(), 0);
    }

    #[test]
    fn surface_height_tracks_edits() {
        let world = flat_world();
        assert_eq!(world.surface_y(8, 8), 60);
        world.set_block(BlockPos::new(8, 75, 8), block::STONE);
        assert_eq!(world.surface_y(8, 8), 75);
    }

    #[test]
    fn snapshot_matches_block_reads() {
        let world = flat_world();
        let pos = ChunkPos::new(-1, -1);
        let raw = world.snapshot(pos);
        assert_eq!(raw.len(), crate::chunk::CHUNK_VOLUME);
        // Column (0, 0) of that chunk: bedrock at the bottom.
        assert_eq!(raw[0], block::BEDROCK);
    }
}
