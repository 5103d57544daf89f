//! Chunk persistence.
//!
//! One file per column: a tiny header naming the format and world height,
//! then the gzipped block array. A file that fails any check loads as
//! `None` and the column regenerates, which beats refusing to boot over
//! one bad file.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use dashmap::DashMap;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use strata_proto::ChunkPos;

use crate::chunk::{Chunk, CHUNK_VOLUME, WORLD_HEIGHT};
use crate::WorldError;

const MAGIC: [u8; 4] = *b"STW1";

pub trait ChunkStore: Send + Sync {
    fn load(&self, pos: ChunkPos) -> Result<Option<Chunk>, WorldError>;
    fn save(&self, pos: ChunkPos, chunk: &Chunk) -> Result<(), WorldError>;
}

fn serialize_chunk(chunk: &Chunk) -> Result<Vec<u8>, WorldError> {
    let mut out = Vec::with_capacity(CHUNK_VOLUME / 8);
    out.extend_from_slice(&MAGIC);
    out.push(WORLD_HEIGHT as u8);
    let mut encoder = GzEncoder::new(out, Compression::default());
    encoder.write_all(chunk.raw())?;
    Ok(encoder.finish()?)
}

fn deserialize_chunk(data: &[u8]) -> Option<Chunk> {
    if data.len() < 5 || data[..4] != MAGIC || data[4] as usize != WORLD_HEIGHT {
        return None;
    }
    let mut raw = Vec::with_capacity(CHUNK_VOLUME);
    GzDecoder::new(&data[5..]).read_to_end(&mut raw).ok()?;
    Chunk::from_raw(&raw)
}

/// One directory of `c.{x}.{z}.dat` files.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorldError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.root.join(format!("c.{}.{}.dat", pos.x, pos.z))
    }
}

impl ChunkStore for DirStore {
    fn load(&self, pos: ChunkPos) -> Result<Option<Chunk>, WorldError> {
        let path = self.chunk_path(pos);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        match deserialize_chunk(&data) {
            Some(chunk) => Ok(Some(chunk)),
            None => {
                warn!(?pos, path = %path.display(), "discarding unreadable chunk file");
                Ok(None)
            }
        }
    }

    fn save(&self, pos: ChunkPos, chunk: &Chunk) -> Result<(), WorldError> {
        fs::write(self.chunk_path(pos), serialize_chunk(chunk)?)?;
        Ok(())
    }
}

/// In-memory store for tests and throwaway worlds.
#[derive(Default)]
pub struct MemoryStore {
    chunks: DashMap<ChunkPos, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl ChunkStore for MemoryStore {
    fn load(&self, pos: ChunkPos) -> Result<Option<Chunk>, WorldError> {
        Ok(self
            .chunks
            .get(&pos)
            .and_then(|data| deserialize_chunk(&data)))
    }

    fn save(&self, pos: ChunkPos, chunk: &Chunk) -> Result<(), WorldError> {
        self.chunks.insert(pos, serialize_chunk(chunk)?);
        Ok(())
    }
}
