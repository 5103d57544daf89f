//! The one authoritative world every dialect sees.
//!
//! A [`World`] is a concurrent chunk cache over a [`store::ChunkStore`] and
//! a [`generator::ChunkGenerator`]. All block access goes through it; the
//! per-connection protocol code never owns terrain.

use thiserror::Error;

pub mod block;
pub mod chunk;
pub mod generator;
pub mod store;
pub mod world;

pub use chunk::{Chunk, CHUNK_SIZE, CHUNK_VOLUME, WORLD_HEIGHT};
pub use generator::{ChunkGenerator, LayeredGenerator};
pub use store::{ChunkStore, DirStore, MemoryStore};
pub use world::World;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("chunk io failure: {0}")]
    Io(#[from] std::io::Error),
}
