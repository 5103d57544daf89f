//! Shared server state, one instance behind an `Arc` for the whole run.

use std::path::Path;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use thiserror::Error;

use strata_proto::PacketRegistry;
use strata_world::{DirStore, LayeredGenerator, World, WorldError};

use crate::chunks::ChunkManager;
use crate::config::ServerConfig;
use crate::events::EventBus;
use crate::persistence::PositionCache;
use crate::players::PlayerRegistry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("world directory: {0}")]
    World(#[from] WorldError),
    #[error("player directory: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ServerState {
    pub config: ServerConfig,
    pub registry: Arc<PacketRegistry>,
    pub world: Arc<World>,
    pub players: PlayerRegistry,
    pub chunks: ChunkManager,
    pub bus: EventBus,
    pub positions: PositionCache,
    /// World time in ticks, advanced by the tick loop.
    pub world_time: AtomicI64,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, StartupError> {
        let root = Path::new(&config.world.directory);
        let store = DirStore::open(root.join("chunks"))?;
        let generator = LayeredGenerator::new(config.world.seed);
        let world = Arc::new(World::new(
            Box::new(store),
            Box::new(generator),
            config.world.seed,
        ));
        let positions = PositionCache::open(root.join("players"))?;
        let chunks = ChunkManager::new(Arc::clone(&world), config.server.view_radius);
        let players = PlayerRegistry::new(config.server.max_players);
        Ok(Arc::new(Self {
            config,
            registry: Arc::new(PacketRegistry::build()),
            world,
            players,
            chunks,
            bus: EventBus::new(),
            positions,
            world_time: AtomicI64::new(0),
        }))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::path::PathBuf;

    use strata_world::{generator::FlatGenerator, MemoryStore};

    pub struct TestState {
        pub state: Arc<ServerState>,
        dir: PathBuf,
    }

    impl Drop for TestState {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    /// In-memory world over a throwaway player directory.
    pub fn state() -> TestState {
        state_with_config(ServerConfig::default())
    }

    pub fn state_with_config(config: ServerConfig) -> TestState {
        let dir =
            std::env::temp_dir().join(format!("strata-state-test-{}", rand::random::<u64>()));
        let world = Arc::new(World::new(
            Box::new(MemoryStore::new()),
            Box::new(FlatGenerator { surface: 60 }),
            config.world.seed,
        ));
        let positions = PositionCache::open(dir.join("players")).unwrap();
        let chunks = ChunkManager::new(Arc::clone(&world), config.server.view_radius);
        let players = PlayerRegistry::new(config.server.max_players);
        let state = Arc::new(ServerState {
            config,
            registry: Arc::new(PacketRegistry::build()),
            world,
            players,
            chunks,
            bus: EventBus::new(),
            positions,
            world_time: AtomicI64::new(0),
        });
        TestState { state, dir }
    }
}
