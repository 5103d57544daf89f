//! Global 50 ms ticker: advances world time, broadcasts keep-alives
//! and time syncs, and drives periodic saves. Connections do their own
//! I/O; this task only publishes to the bus and touches storage.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use strata_proto::packets::{KeepAlive, TimeUpdate};

use crate::state::ServerState;

const TICK: Duration = Duration::from_millis(50);
const KEEP_ALIVE_TICKS: i64 = 40;
const TIME_SYNC_TICKS: i64 = 20;
/// Ticks per in-game day; the clock wraps here.
const DAY_LENGTH: i64 = 24_000;

pub async fn run(state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) {
    let save_every = state.config.world.auto_save_interval * 20;
    let mut interval = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let tick = state.world_time.fetch_add(1, Ordering::Relaxed) + 1;
                if tick % TIME_SYNC_TICKS == 0 {
                    let sync = TimeUpdate {
                        world_age: tick,
                        time: tick % DAY_LENGTH,
                    };
                    state.bus.publish(None, sync.into());
                }
                if tick % KEEP_ALIVE_TICKS == 0 {
                    state.bus.publish(None, KeepAlive { id: rand::random() }.into());
                }
                if save_every != 0 && tick as u64 % save_every == 0 {
                    save(&state);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("saving before shutdown");
                    save(&state);
                    return;
                }
            }
        }
    }
}

/// Flush dirty chunks and snapshot every online player's position.
fn save(state: &ServerState) {
    match state.world.flush_dirty() {
        Ok(0) => {}
        Ok(chunks) => debug!(chunks, "saved dirty chunks"),
        Err(e) => warn!("world save failed: {e}"),
    }
    for player in state.players.all() {
        let (pos, look) = player.position();
        if let Err(e) = state.positions.store(&player.username, pos, look) {
            warn!(player = %player.username, "position save failed: {e}");
        }
    }
}
