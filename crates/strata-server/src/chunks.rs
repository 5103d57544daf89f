//! Per-player chunk visibility.
//!
//! Tracks which columns each client has been sent and keeps that set
//! converged on the Chebyshev box around the player's current chunk.
//! The shared cache in `strata-world` holds each column once; a column
//! leaves the cache only when the last view that needed it lets go.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use strata_proto::ChunkPos;
use strata_world::World;

use crate::players::PlayerId;

#[derive(Debug)]
struct PlayerView {
    visible: HashSet<ChunkPos>,
}

/// Columns to send and columns to release after a view move. `enter`
/// is ordered nearest-first from the new center.
#[derive(Debug, Default, PartialEq)]
pub struct ViewDelta {
    pub enter: Vec<ChunkPos>,
    pub leave: Vec<ChunkPos>,
}

pub struct ChunkManager {
    world: Arc<World>,
    views: DashMap<PlayerId, PlayerView>,
    radius: i32,
}

impl ChunkManager {
    pub fn new(world: Arc<World>, radius: i32) -> Self {
        Self {
            world,
            views: DashMap::new(),
            radius,
        }
    }

    fn desired_box(&self, center: ChunkPos) -> HashSet<ChunkPos> {
        let mut set = HashSet::new();
        for x in (center.x - self.radius)..=(center.x + self.radius) {
            for z in (center.z - self.radius)..=(center.z + self.radius) {
                set.insert(ChunkPos::new(x, z));
            }
        }
        set
    }

    /// Move a player's view to `center` and report the diff. Entering
    /// columns are resident in the shared cache by the time this
    /// returns, so the caller can snapshot them for sending.
    pub fn update_view(&self, player: PlayerId, center: ChunkPos) -> ViewDelta {
        let desired = self.desired_box(center);
        let mut view = self.views.entry(player).or_insert_with(|| PlayerView {
            visible: HashSet::new(),
        });

        let mut enter: Vec<ChunkPos> = desired.difference(&view.visible).copied().collect();
        enter.sort_by_key(|pos| pos.distance_sq(center));
        let leave: Vec<ChunkPos> = view.visible.difference(&desired).copied().collect();

        view.visible = desired;
        drop(view);

        for &pos in &enter {
            self.world.ensure_chunk(pos);
        }
        for &pos in &leave {
            self.release_column(pos);
        }
        ViewDelta { enter, leave }
    }

    /// Pin an exact inclusive chunk rectangle as a player's view. Used
    /// for the Classic level region, which never follows the player.
    pub fn pin_region(&self, player: PlayerId, min: ChunkPos, max: ChunkPos) {
        let mut visible = HashSet::new();
        for x in min.x..=max.x {
            for z in min.z..=max.z {
                visible.insert(ChunkPos::new(x, z));
            }
        }
        for &pos in &visible {
            self.world.ensure_chunk(pos);
        }
        self.views.insert(player, PlayerView { visible });
    }

    /// Drop a player's whole view, evicting columns nobody else holds.
    /// Returns how many columns left the cache.
    pub fn release(&self, player: PlayerId) -> usize {
        let Some((_, view)) = self.views.remove(&player) else {
            return 0;
        };
        let mut evicted = 0;
        for pos in view.visible {
            if self.release_column(pos) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Evict a column if no remaining view includes it.
    fn release_column(&self, pos: ChunkPos) -> bool {
        if self.views.iter().any(|view| view.visible.contains(&pos)) {
            return false;
        }
        if let Err(err) = self.world.evict(pos) {
            warn!(?pos, %err, "could not flush evicted chunk");
        }
        true
    }

    pub fn visible_to(&self, player: PlayerId, pos: ChunkPos) -> bool {
        self.views
            .get(&player)
            .is_some_and(|view| view.visible.contains(&pos))
    }

    #[cfg(test)]
    fn visible_set(&self, player: PlayerId) -> HashSet<ChunkPos> {
        self.views
            .get(&player)
            .map(|view| view.visible.clone())
            .unwrap_or_default()
    }
}
