//! Player position records.
//!
//! One file per username under `players/`, written at disconnect and on
//! auto-save, read back at login so a returning player stands where
//! they left. Coordinates are stored in fixed-point thirty-seconds with
//! byte rotations, so a round trip costs at most 1/32 of a block.
//!
//! The in-memory map is consulted before disk: a reconnect during the
//! same run must see the most recent disconnect position even when the
//! periodic save has not caught up yet.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::warn;

use strata_proto::codec::{from_angle_byte, from_fixed32, to_angle_byte, to_fixed32};
use strata_proto::{Look, Position};

const RECORD_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SavedPosition {
    x: i32,
    y: i32,
    z: i32,
    yaw: u8,
    pitch: u8,
}

impl SavedPosition {
    fn quantize(pos: Position, look: Look) -> Self {
        Self {
            x: to_fixed32(pos.x),
            y: to_fixed32(pos.y),
            z: to_fixed32(pos.z),
            yaw: to_angle_byte(look.yaw),
            pitch: to_angle_byte(look.pitch),
        }
    }

    fn restore(self) -> (Position, Look) {
        (
            Position::new(from_fixed32(self.x), from_fixed32(self.y), from_fixed32(self.z)),
            Look::new(from_angle_byte(self.yaw), from_angle_byte(self.pitch)),
        )
    }

    fn to_bytes(self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&self.x.to_be_bytes());
        out[4..8].copy_from_slice(&self.y.to_be_bytes());
        out[8..12].copy_from_slice(&self.z.to_be_bytes());
        out[12] = self.yaw;
        out[13] = self.pitch;
        out
    }

    fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != RECORD_LEN {
            return None;
        }
        Some(Self {
            x: i32::from_be_bytes(data[0..4].try_into().ok()?),
            y: i32::from_be_bytes(data[4..8].try_into().ok()?),
            z: i32::from_be_bytes(data[8..12].try_into().ok()?),
            yaw: data[12],
            pitch: data[13],
        })
    }
}

pub struct PositionCache {
    memory: DashMap<String, SavedPosition>,
    dir: PathBuf,
}

impl PositionCache {
    pub fn open<P: AsRef<Path>>(dir: P) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            memory: DashMap::new(),
            dir,
        })
    }

    fn record_path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{}.pos", username.to_ascii_lowercase()))
    }

    pub fn store(&self, username: &str, pos: Position, look: Look) -> std::io::Result<()> {
        let saved = SavedPosition::quantize(pos, look);
        self.memory.insert(username.to_ascii_lowercase(), saved);
        std::fs::write(self.record_path(username), saved.to_bytes())
    }

    /// Last known position for this username, or `None` for a first
    /// join. Disk hits warm the memory map.
    pub fn recall(&self, username: &str) -> Option<(Position, Look)> {
        let key = username.to_ascii_lowercase();
        if let Some(saved) = self.memory.get(&key) {
            return Some(saved.restore());
        }
        let path = self.record_path(username);
        if !path.exists() {
            return None;
        }
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                warn!(username, %err, "could not read position record");
                return None;
            }
        };
        match SavedPosition::from_bytes(&data) {
            Some(saved) => {
                self.memory.insert(key, saved);
                Some(saved.restore())
            }
            None => {
                warn!(username, path = %path.display(), "discarding malformed position record");
                None
            }
        }
    }
}
