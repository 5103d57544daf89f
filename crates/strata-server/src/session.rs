//! The shared gameplay core.
//!
//! Both family state machines drive a [`Session`] once login completes:
//! the join sequence, movement validation, block edits, replenishment
//! and chat are written once here, in canonical terms. The session is
//! synchronous; packets it wants written go into an outbox the owning
//! connection loop drains and translates, so a session can never block
//! on its own outbound queue. Only the delayed task slots touch the
//! player's channel directly.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};

use strata_proto::packets::{
    classic::LEVEL_CHUNK_LEN, BlockChange, BlockDig, BlockPlace, Chat, ChunkData, ChunkUnload,
    ClassicLevelChunk, ClassicLevelFinalize, ClassicLevelInit, ClassicSetBlock, DespawnPlayer,
    DigStatus, EntityTeleport, PlayerListItem, PositionLook, SetSlot, SpawnPlayer, SpawnPosition,
    SwingArm,
};
use strata_proto::{
    BlockPos, ChunkPos, ItemStack, Look, Packet, Position, ProtocolVersion, EYE_HEIGHT,
};
use strata_world::{block, World, CHUNK_SIZE, WORLD_HEIGHT};

use crate::mapping::{BlockMapper, EraBlockMapper};
use crate::players::PlayerHandle;
use crate::state::ServerState;
use crate::tasks::PlayerTasks;
use crate::translator::CLASSIC_EXTENT;

/// Squared displacement above which a movement packet is a teleport
/// attempt and is snapped back.
const MAX_MOVE_SQ: f64 = 100.0;
/// Fall distance that triggers a rescue teleport on dialects without
/// their own fall damage.
const FALL_RESCUE_DISTANCE: f64 = 20.0;
/// Horizontal radius around the origin that counts as a death-reset
/// arrival point.
const DEATH_RESET_RADIUS: f64 = 3.0;
/// Minimum horizontal distance from the origin for a jump to the origin
/// to read as a client-side death reset rather than ordinary walking.
const DEATH_RESET_MIN_DIST: f64 = 32.0;
const REPLENISH_DELAY: Duration = Duration::from_millis(300);
const REVEAL_DELAY: Duration = Duration::from_millis(600);
const FULL_STACK: u8 = 64;
const PLAYER_HALF_WIDTH: f64 = 0.3;
const PLAYER_HEIGHT: f64 = 1.8;
/// First hotbar slot in the window-0 slot numbering.
const HOTBAR_SLOT_OFFSET: i16 = 36;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("level encode: {0}")]
    Level(#[from] std::io::Error),
}

/// What the connection loop should do after a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Closed,
}

/// Login usernames: 1..=16 word characters.
pub fn validate_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 16
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Where a player stands when they join: their persisted position,
/// lifted out of any terrain that grew into it, or the default spawn.
pub fn resolve_spawn(state: &ServerState, username: &str) -> (Position, Look) {
    match state.positions.recall(username) {
        Some((pos, look)) => (lift_out_of_solid(&state.world, pos), look),
        None => (default_spawn(&state.world), Look::default()),
    }
}

/// Default spawn column near the world origin: highest solid block with
/// two air blocks above it.
fn default_spawn(world: &World) -> Position {
    let (x, z) = (8, 8);
    world.ensure_chunk(ChunkPos::new(0, 0));
    let mut feet = world.surface_y(x, z) + 1;
    for y in (0..WORLD_HEIGHT as i32 - 2).rev() {
        if block::is_solid(world.block(BlockPos::new(x, y, z)))
            && world.block(BlockPos::new(x, y + 1, z)) == block::AIR
            && world.block(BlockPos::new(x, y + 2, z)) == block::AIR
        {
            feet = y + 1;
            break;
        }
    }
    Position::new(x as f64 + 0.5, feet as f64 + EYE_HEIGHT, z as f64 + 0.5)
}

/// Scan upward until the feet and head cells are both clear.
fn lift_out_of_solid(world: &World, pos: Position) -> Position {
    world.ensure_chunk(pos.chunk_pos());
    let cell = pos.feet_block();
    let clear = |feet: i32| {
        !block::is_solid(world.block(BlockPos::new(cell.x, feet, cell.z)))
            && !block::is_solid(world.block(BlockPos::new(cell.x, feet + 1, cell.z)))
    };
    let start = cell.y.max(0);
    if cell.y == start && clear(start) {
        return pos;
    }
    let mut feet = start;
    while feet + 1 < WORLD_HEIGHT as i32 && !clear(feet) {
        feet += 1;
    }
    Position::new(pos.x, feet as f64 + EYE_HEIGHT, pos.z)
}

fn intersects_player(cell: BlockPos, pos: Position) -> bool {
    let feet = pos.feet_y();
    (cell.x as f64) < pos.x + PLAYER_HALF_WIDTH
        && (cell.x + 1) as f64 > pos.x - PLAYER_HALF_WIDTH
        && (cell.z as f64) < pos.z + PLAYER_HALF_WIDTH
        && (cell.z + 1) as f64 > pos.z - PLAYER_HALF_WIDTH
        && (cell.y as f64) < feet + PLAYER_HEIGHT
        && (cell.y + 1) as f64 > feet
}

/// Server-side estimate of what the player is holding. Shared with the
/// replenish task, which reads it when the debounce expires.
#[derive(Debug, Default)]
struct HeldStack {
    hotbar_slot: i16,
    item: Option<ItemStack>,
}

pub struct Session {
    state: Arc<ServerState>,
    pub handle: Arc<PlayerHandle>,
    version: ProtocolVersion,
    mapper: Arc<dyn BlockMapper>,
    tasks: Arc<PlayerTasks>,
    held: Arc<Mutex<HeldStack>>,
    spawned: bool,
    last_chunk: ChunkPos,
    /// Eye-level Y where the current fall began, for rescue bookkeeping.
    fall_start: Option<f64>,
    outbox: Vec<Packet>,
}

impl Session {
    pub fn new(state: Arc<ServerState>, handle: Arc<PlayerHandle>) -> Self {
        let version = handle.version;
        let last_chunk = handle.position().0.chunk_pos();
        Self {
            state,
            handle,
            version,
            mapper: Arc::new(EraBlockMapper::for_version(version)),
            tasks: Arc::new(PlayerTasks::new()),
            held: Arc::new(Mutex::new(HeldStack::default())),
            spawned: false,
            last_chunk,
            fall_start: None,
            outbox: Vec::new(),
        }
    }

    /// Packets queued for this connection since the last drain. The
    /// loop writes them, translated, in order.
    pub fn take_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    // ── join ────────────────────────────────────────────────────────────────

    /// Everything between login acceptance and gameplay: spawn point,
    /// terrain, the initial teleport, and the arrival broadcasts.
    /// Movement is ignored until this has run.
    pub fn run_join(&mut self) -> Result<(), SessionError> {
        let id = self.handle.id;
        let (pos, look) = self.handle.position();

        self.outbox.push(
            SpawnPosition {
                pos: default_spawn(&self.state.world).feet_block(),
            }
            .into(),
        );

        if self.version.is_classic() {
            self.push_level_transfer()?;
        } else {
            let delta = self.state.chunks.update_view(id, pos.chunk_pos());
            for chunk in delta.enter {
                self.push_column(chunk);
            }
        }
        self.last_chunk = pos.chunk_pos();

        self.outbox.push(
            PositionLook {
                pos,
                look,
                on_ground: false,
            }
            .into(),
        );

        // Announce the arrival: tab entry first so the newest dialect
        // can resolve the spawn's uuid, then the entity, then the line.
        self.state.bus.publish(
            None,
            PlayerListItem {
                username: self.handle.username.clone(),
                uuid: self.handle.uuid,
                online: true,
                ping: 0,
            }
            .into(),
        );
        self.state.bus.publish(
            Some(id),
            SpawnPlayer {
                player_id: id,
                uuid: self.handle.uuid,
                username: self.handle.username.clone(),
                pos,
                look,
                current_item: 0,
            }
            .into(),
        );
        self.state.bus.publish(
            None,
            Chat {
                message: format!("{} joined the game", self.handle.username),
            }
            .into(),
        );

        // Introduce everyone already here to the newcomer.
        for other in self.state.players.all() {
            if other.id == id {
                continue;
            }
            let (opos, olook) = other.position();
            self.outbox.push(
                PlayerListItem {
                    username: other.username.clone(),
                    uuid: other.uuid,
                    online: true,
                    ping: 0,
                }
                .into(),
            );
            self.outbox.push(
                SpawnPlayer {
                    player_id: other.id,
                    uuid: other.uuid,
                    username: other.username.clone(),
                    pos: opos,
                    look: olook,
                    current_item: 0,
                }
                .into(),
            );
        }

        self.spawned = true;
        info!(player = %self.handle.username, id, ?pos, "player joined");
        Ok(())
    }

    fn push_column(&mut self, pos: ChunkPos) {
        self.outbox.push(
            ChunkData {
                pos,
                blocks: self.state.world.snapshot(pos).into(),
            }
            .into(),
        );
    }

    /// The Classic one-shot level transfer: the fixed cube around the
    /// origin as one gzip stream, cut into 1 KiB pieces.
    fn push_level_transfer(&mut self) -> Result<(), SessionError> {
        let extent = CLASSIC_EXTENT as usize;
        let region_chunks = (CLASSIC_EXTENT / CHUNK_SIZE as i32) - 1;
        self.state.chunks.pin_region(
            self.handle.id,
            ChunkPos::new(0, 0),
            ChunkPos::new(region_chunks, region_chunks),
        );

        // Reorder from per-column x-z-y into the level's y-z-x order.
        let mut blocks = vec![0u8; extent * extent * extent];
        for cx in 0..=region_chunks {
            for cz in 0..=region_chunks {
                let raw = self.state.world.snapshot(ChunkPos::new(cx, cz));
                for lx in 0..CHUNK_SIZE {
                    for lz in 0..CHUNK_SIZE {
                        let gx = cx as usize * CHUNK_SIZE + lx;
                        let gz = cz as usize * CHUNK_SIZE + lz;
                        for y in 0..WORLD_HEIGHT {
                            blocks[(y * extent + gz) * extent + gx] =
                                raw[(lx * CHUNK_SIZE + lz) * WORLD_HEIGHT + y];
                        }
                    }
                }
            }
        }
        self.mapper.map_all(&mut blocks);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&(blocks.len() as u32).to_be_bytes())?;
        encoder.write_all(&blocks)?;
        let payload = encoder.finish()?;

        self.outbox.push(ClassicLevelInit.into());
        let total = payload.len();
        let mut sent = 0;
        for piece in payload.chunks(LEVEL_CHUNK_LEN) {
            sent += piece.len();
            self.outbox.push(
                ClassicLevelChunk {
                    data: bytes::Bytes::copy_from_slice(piece),
                    percent: ((sent * 100) / total) as u8,
                }
                .into(),
            );
        }
        self.outbox.push(
            ClassicLevelFinalize {
                x_size: CLASSIC_EXTENT as i16,
                y_size: CLASSIC_EXTENT as i16,
                z_size: CLASSIC_EXTENT as i16,
            }
            .into(),
        );
        Ok(())
    }

    // ── play ────────────────────────────────────────────────────────────────

    pub fn handle_packet(&mut self, packet: &Packet) -> Flow {
        match packet {
            Packet::KeepAlive(_) => Flow::Continue,
            Packet::Chat(chat) => {
                self.handle_chat(&chat.message);
                Flow::Continue
            }
            Packet::PlayerOnGround(p) => {
                self.handle_movement(None, None, p.on_ground);
                Flow::Continue
            }
            Packet::PlayerPosition(p) => {
                self.handle_movement(Some(p.pos), None, p.on_ground);
                Flow::Continue
            }
            Packet::PlayerLook(p) => {
                self.handle_movement(None, Some(p.look), p.on_ground);
                Flow::Continue
            }
            Packet::PlayerPositionLook(p) => {
                self.handle_movement(Some(p.pos), Some(p.look), p.on_ground);
                Flow::Continue
            }
            Packet::BlockDig(p) => {
                self.handle_dig(p);
                Flow::Continue
            }
            Packet::BlockPlace(p) => {
                self.handle_place(p);
                Flow::Continue
            }
            Packet::ClassicSetBlock(p) => {
                self.handle_classic_set_block(p);
                Flow::Continue
            }
            Packet::HeldItemChange(p) => {
                let mut held = self.held.lock().unwrap();
                held.hotbar_slot = p.slot;
                held.item = None;
                Flow::Continue
            }
            Packet::CreativeSlot(p) => {
                let mut held = self.held.lock().unwrap();
                if p.slot == HOTBAR_SLOT_OFFSET + held.hotbar_slot {
                    held.item = p.item;
                }
                Flow::Continue
            }
            Packet::SwingArm(_) => {
                self.state.bus.publish(
                    Some(self.handle.id),
                    SwingArm {
                        player_id: self.handle.id,
                    }
                    .into(),
                );
                Flow::Continue
            }
            Packet::Disconnect(_) => Flow::Closed,
            other => {
                debug!(kind = ?other.kind(), "ignoring unexpected packet");
                Flow::Continue
            }
        }
    }

    fn handle_chat(&mut self, raw: &str) {
        let message = raw.trim();
        if message.is_empty() {
            return;
        }
        if let Some(command) = message.strip_prefix('/') {
            // Command dispatch is an external concern; log and tell the
            // client so the input is not silently eaten.
            info!(player = %self.handle.username, command, "unhandled command");
            self.outbox.push(
                Chat {
                    message: "Unknown command.".into(),
                }
                .into(),
            );
            return;
        }
        self.state.bus.publish(
            None,
            Chat {
                message: format!("<{}> {}", self.handle.username, message),
            }
            .into(),
        );
    }

    // ── movement ────────────────────────────────────────────────────────────

    fn handle_movement(&mut self, pos: Option<Position>, look: Option<Look>, on_ground: bool) {
        if !self.spawned {
            return;
        }
        let id = self.handle.id;
        let (prev_pos, prev_look) = self.handle.position();
        let new_look = look.unwrap_or(prev_look);

        let Some(new_pos) = pos else {
            if on_ground {
                self.fall_start = None;
            }
            if look.is_some() {
                self.handle.set_position(prev_pos, new_look);
                self.state.bus.publish(
                    Some(id),
                    EntityTeleport {
                        player_id: id,
                        pos: prev_pos,
                        look: new_look,
                        on_ground,
                    }
                    .into(),
                );
            }
            return;
        };

        // A jump to the origin from far away is the old clients' death
        // reset, not a teleport cheat: answer with a fresh spawn. Any
        // such jump would also trip the displacement gate below, so
        // this is checked first.
        if horizontal_dist_sq(new_pos) < DEATH_RESET_RADIUS * DEATH_RESET_RADIUS
            && horizontal_dist_sq(prev_pos) > DEATH_RESET_MIN_DIST * DEATH_RESET_MIN_DIST
        {
            debug!(player = %self.handle.username, "death reset");
            self.teleport_to(default_spawn(&self.state.world), Look::default());
            return;
        }

        if prev_pos.distance_sq(new_pos) > MAX_MOVE_SQ {
            debug!(player = %self.handle.username, from = ?prev_pos, to = ?new_pos,
                "rejecting oversized move");
            self.outbox.push(
                PositionLook {
                    pos: prev_pos,
                    look: prev_look,
                    on_ground: false,
                }
                .into(),
            );
            return;
        }

        if self.track_fall(prev_pos, new_pos, on_ground) {
            let ground = self
                .state
                .world
                .surface_y(new_pos.x.floor() as i32, new_pos.z.floor() as i32);
            let rescue = Position::new(
                new_pos.x,
                (ground + 1) as f64 + EYE_HEIGHT,
                new_pos.z,
            );
            debug!(player = %self.handle.username, ?rescue, "fall rescue");
            self.teleport_to(rescue, new_look);
            return;
        }

        self.handle.set_position(new_pos, new_look);
        self.state.bus.publish(
            Some(id),
            EntityTeleport {
                player_id: id,
                pos: new_pos,
                look: new_look,
                on_ground,
            }
            .into(),
        );
        let chunk = new_pos.chunk_pos();
        if chunk != self.last_chunk {
            self.last_chunk = chunk;
            self.cross_chunk_boundary(chunk);
        }
    }

    /// Returns true when an unreported fall has grown past the rescue
    /// threshold. Classic reads always claim on-ground, so a
    /// non-descending step is what counts as landing there.
    fn track_fall(&mut self, prev: Position, new_pos: Position, on_ground: bool) -> bool {
        if self.version.reports_fall_damage() {
            return false;
        }
        let landed = if self.version.is_classic() {
            new_pos.y >= prev.y
        } else {
            on_ground
        };
        if landed {
            self.fall_start = None;
            return false;
        }
        let start = *self.fall_start.get_or_insert(prev.y);
        start - new_pos.y > FALL_RESCUE_DISTANCE
    }

    /// Server-initiated move: correct the client, update the registry,
    /// and let everyone else see the jump.
    fn teleport_to(&mut self, pos: Position, look: Look) {
        let id = self.handle.id;
        self.fall_start = None;
        self.handle.set_position(pos, look);
        self.outbox.push(
            PositionLook {
                pos,
                look,
                on_ground: false,
            }
            .into(),
        );
        self.state.bus.publish(
            Some(id),
            EntityTeleport {
                player_id: id,
                pos,
                look,
                on_ground: false,
            }
            .into(),
        );
        let chunk = pos.chunk_pos();
        if chunk != self.last_chunk {
            self.last_chunk = chunk;
            self.cross_chunk_boundary(chunk);
        }
    }

    fn cross_chunk_boundary(&mut self, center: ChunkPos) {
        // The Classic view is pinned to its level region.
        if self.version.is_classic() {
            return;
        }
        let delta = self.state.chunks.update_view(self.handle.id, center);
        for pos in delta.enter {
            self.push_column(pos);
        }
        for pos in delta.leave {
            self.outbox.push(ChunkUnload { pos }.into());
        }
    }

    // ── block edits ─────────────────────────────────────────────────────────

    fn handle_dig(&mut self, dig: &BlockDig) {
        match dig.status {
            DigStatus::Started => {
                if !self.version.reports_dig_completion() {
                    self.schedule_reveal(dig.pos);
                }
            }
            DigStatus::Cancelled => self.tasks.reveal.cancel(),
            DigStatus::Finished => self.dig_block(dig.pos),
            // Item drops are an inventory concern this server does not
            // model.
            DigStatus::DropStack | DigStatus::DropItem | DigStatus::ReleaseUseItem => {}
        }
    }

    fn handle_place(&mut self, place: &BlockPlace) {
        let Some(face) = place.face else {
            // Face-less use-item clicks carry no block target.
            return;
        };
        let Some(item) = place.held else {
            return;
        };
        let mut held = self.held.lock().unwrap();
        if held.item.map(|held| held.id) != Some(item.id) {
            held.item = Some(item);
        }
        drop(held);
        if item.id < 1 || item.id > u8::MAX as i16 {
            return;
        }
        let target = place.pos.offset(face);
        if self.try_place(target, item.id as u8) && self.version.has_inventory() {
            self.consume_held();
        }
    }

    fn handle_classic_set_block(&mut self, set: &ClassicSetBlock) {
        let pos = BlockPos::new(set.x as i32, set.y as i32, set.z as i32);
        if set.mode == 0 {
            self.dig_block(pos);
        } else {
            self.try_place(pos, set.block);
        }
    }

    /// Validate and apply one placement. A rejection is answered with a
    /// corrective `BlockChange` to this client only, so its predicted
    /// block disappears; nothing is broadcast.
    fn try_place(&mut self, target: BlockPos, id: u8) -> bool {
        let in_bounds = target.y >= 0 && target.y < WORLD_HEIGHT as i32;
        if !in_bounds || !self.mapper.placeable(id) {
            self.push_corrective_air(target);
            return false;
        }
        if intersects_player(target, self.handle.position().0) {
            self.push_corrective_air(target);
            return false;
        }
        // Reads do not load; make the column resident before the
        // occupancy check so a non-resident cell is not mistaken for air.
        self.state.world.ensure_chunk(target.chunk_pos());
        let existing = self.state.world.block(target);
        if existing != block::AIR {
            // Occupied: remind the client what is really there.
            self.outbox.push(
                BlockChange {
                    pos: target,
                    block_id: existing,
                    meta: 0,
                }
                .into(),
            );
            return false;
        }
        if !self.state.world.set_block(target, id) {
            self.push_corrective_air(target);
            return false;
        }
        self.state.bus.publish(
            None,
            BlockChange {
                pos: target,
                block_id: id,
                meta: 0,
            }
            .into(),
        );
        true
    }

    fn dig_block(&mut self, pos: BlockPos) {
        if pos.y < 0 || pos.y >= WORLD_HEIGHT as i32 {
            return;
        }
        if self.state.world.set_block(pos, block::AIR) {
            self.state.bus.publish(
                None,
                BlockChange {
                    pos,
                    block_id: block::AIR,
                    meta: 0,
                }
                .into(),
            );
        }
    }

    fn push_corrective_air(&mut self, pos: BlockPos) {
        self.outbox.push(
            BlockChange {
                pos,
                block_id: block::AIR,
                meta: 0,
            }
            .into(),
        );
    }

    // ── replenishment ───────────────────────────────────────────────────────

    fn consume_held(&self) {
        {
            let mut held = self.held.lock().unwrap();
            if let Some(item) = held.item.as_mut() {
                item.count = item.count.saturating_sub(1);
            }
        }
        self.schedule_replenish();
    }

    /// (Re)arm the top-up. The slot holds one task, so a burst of
    /// placements collapses to one send timed from the last of them.
    fn schedule_replenish(&self) {
        let handle = Arc::clone(&self.handle);
        let held = Arc::clone(&self.held);
        self.tasks.replenish.schedule(tokio::spawn(async move {
            tokio::time::sleep(REPLENISH_DELAY).await;
            let packet = {
                let mut held = held.lock().unwrap();
                let slot = HOTBAR_SLOT_OFFSET + held.hotbar_slot;
                let Some(item) = held.item.as_mut() else {
                    return;
                };
                item.count = FULL_STACK;
                SetSlot {
                    window_id: 0,
                    slot,
                    item: Some(*item),
                }
            };
            handle.send(packet.into()).await;
        }));
    }

    /// Old diggers never report completion; break the block for them
    /// after the delay unless they cancel.
    fn schedule_reveal(&self, pos: BlockPos) {
        let state = Arc::clone(&self.state);
        self.tasks.reveal.schedule(tokio::spawn(async move {
            tokio::time::sleep(REVEAL_DELAY).await;
            if state.world.set_block(pos, block::AIR) {
                state.bus.publish(
                    None,
                    BlockChange {
                        pos,
                        block_id: block::AIR,
                        meta: 0,
                    }
                    .into(),
                );
            }
        }));
    }

    // ── teardown ────────────────────────────────────────────────────────────

    /// Runs exactly once when the connection ends, however it ends.
    pub fn teardown(&mut self) {
        let id = self.handle.id;
        let (pos, look) = self.handle.position();
        if let Err(err) = self.state.positions.store(&self.handle.username, pos, look) {
            warn!(player = %self.handle.username, %err, "could not persist position");
        }
        self.tasks.cancel_all();
        let evicted = self.state.chunks.release(id);
        self.state.players.remove(id);
        self.state.bus.publish(
            Some(id),
            DespawnPlayer { player_id: id }.into(),
        );
        self.state.bus.publish(
            Some(id),
            PlayerListItem {
                username: self.handle.username.clone(),
                uuid: self.handle.uuid,
                online: false,
                ping: 0,
            }
            .into(),
        );
        self.state.bus.publish(
            Some(id),
            Chat {
                message: format!("{} left the game", self.handle.username),
            }
            .into(),
        );
        info!(player = %self.handle.username, id, evicted, "player disconnected");
    }
}

fn horizontal_dist_sq(pos: Position) -> f64 {
    pos.x * pos.x + pos.z * pos.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use flate2::read::GzDecoder;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::mpsc;

    use strata_proto::packets::{CreativeSlot, Disconnect, HeldItemChange, KeepAlive, PlayerPosition};
    use strata_proto::BlockFace;

    use crate::config::ServerConfig;
    use crate::events::Broadcast;
    use crate::state::testing::{self, TestState};

    fn small_state() -> TestState {
        let mut config = ServerConfig::default();
        config.server.view_radius = 1;
        testing::state_with_config(config)
    }

    fn join(
        ts: &TestState,
        name: &str,
        version: ProtocolVersion,
    ) -> (Session, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(256);
        let (pos, look) = resolve_spawn(&ts.state, name);
        let handle = ts
            .state
            .players
            .register(name, version, tx, pos, look)
            .unwrap();
        (Session::new(Arc::clone(&ts.state), handle), rx)
    }

    fn joined(
        ts: &TestState,
        name: &str,
        version: ProtocolVersion,
    ) -> (Session, mpsc::Receiver<Packet>) {
        let (mut session, rx) = join(ts, name, version);
        session.run_join().unwrap();
        session.take_outbox();
        (session, rx)
    }

    fn move_to(pos: Position) -> Packet {
        PlayerPosition {
            pos,
            on_ground: true,
        }
        .into()
    }

    fn drain_bus(rx: &mut tokio::sync::broadcast::Receiver<Broadcast>) -> Vec<Broadcast> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
                Err(err) => panic!("bus receiver lagged: {err}"),
            }
        }
    }

    // On the flat test world the surface is at 60, so feet stand at 61.
    fn standing(x: f64, z: f64) -> Position {
        Position::new(x, 61.0 + EYE_HEIGHT, z)
    }

    #[test]
    fn join_sequence_order_is_contractual() {
        let ts = small_state();
        let mut bus = ts.state.bus.subscribe();
        let (mut session, _rx) = join(&ts, "alice", ProtocolVersion::NATIVE);
        session.run_join().unwrap();
        let outbox = session.take_outbox();

        assert!(matches!(outbox[0], Packet::SpawnPosition(_)));
        let columns = 9;
        for packet in &outbox[1..=columns] {
            assert!(matches!(packet, Packet::ChunkData(_)), "{packet:?}");
        }
        assert!(matches!(outbox[columns + 1], Packet::PositionLook(_)));

        // Nearest column first: the one the player stands in.
        let own_chunk = session.handle.position().0.chunk_pos();
        match &outbox[1] {
            Packet::ChunkData(c) => assert_eq!(c.pos, own_chunk),
            other => panic!("expected column, got {other:?}"),
        }

        let events = drain_bus(&mut bus);
        assert!(matches!(events[0].packet, Packet::PlayerListItem(_)));
        assert_eq!(events[0].source, None);
        assert!(matches!(events[1].packet, Packet::SpawnPlayer(_)));
        assert_eq!(events[1].source, Some(session.handle.id));
        assert!(matches!(events[2].packet, Packet::Chat(_)));
    }

    #[test]
    fn newcomer_is_introduced_to_existing_players() {
        let ts = small_state();
        let (_alice, _arx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let (mut bob, _brx) = join(&ts, "bob", ProtocolVersion::legacy(23));
        bob.run_join().unwrap();
        let outbox = bob.take_outbox();
        let spawned: Vec<_> = outbox
            .iter()
            .filter_map(|p| match p {
                Packet::SpawnPlayer(s) => Some(s.username.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(spawned, vec!["alice".to_string()]);
        // Tab entry precedes the entity spawn.
        let tab_at = outbox
            .iter()
            .position(|p| matches!(p, Packet::PlayerListItem(_)))
            .unwrap();
        let spawn_at = outbox
            .iter()
            .position(|p| matches!(p, Packet::SpawnPlayer(_)))
            .unwrap();
        assert!(tab_at < spawn_at);
    }

    #[test]
    fn movement_before_spawn_is_ignored() {
        let ts = small_state();
        let mut bus = ts.state.bus.subscribe();
        let (mut session, _rx) = join(&ts, "alice", ProtocolVersion::NATIVE);
        let before = session.handle.position().0;
        session.handle_packet(&move_to(standing(50.0, 50.0)));
        assert_eq!(session.handle.position().0, before);
        assert!(session.take_outbox().is_empty());
        assert!(drain_bus(&mut bus).is_empty());
    }

    #[test]
    fn accepted_move_updates_and_broadcasts() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        let target = standing(10.0, 9.0);
        session.handle_packet(&move_to(target));
        assert_eq!(session.handle.position().0, target);
        let events = drain_bus(&mut bus);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, Some(session.handle.id));
        match &events[0].packet {
            Packet::EntityTeleport(t) => {
                assert_eq!(t.player_id, session.handle.id);
                assert_eq!(t.pos, target);
            }
            other => panic!("expected teleport, got {other:?}"),
        }
    }

    #[test]
    fn oversized_move_snaps_back() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        let before = session.handle.position().0;
        session.handle_packet(&move_to(standing(before.x + 30.0, before.z)));
        assert_eq!(session.handle.position().0, before);
        let outbox = session.take_outbox();
        match &outbox[..] {
            [Packet::PositionLook(p)] => assert_eq!(p.pos, before),
            other => panic!("expected one snap-back, got {other:?}"),
        }
        assert!(drain_bus(&mut bus).is_empty());
    }

    #[test]
    fn chunk_crossing_streams_nearest_first() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        // Walk one chunk east in small steps.
        session.handle_packet(&move_to(standing(17.0, 8.5)));
        let outbox = session.take_outbox();
        let entered: Vec<ChunkPos> = outbox
            .iter()
            .filter_map(|p| match p {
                Packet::ChunkData(c) => Some(c.pos),
                _ => None,
            })
            .collect();
        let left: Vec<ChunkPos> = outbox
            .iter()
            .filter_map(|p| match p {
                Packet::ChunkUnload(c) => Some(c.pos),
                _ => None,
            })
            .collect();
        assert_eq!(entered.len(), 3);
        assert_eq!(left.len(), 3);
        let center = ChunkPos::new(1, 0);
        let dists: Vec<i64> = entered.iter().map(|c| c.distance_sq(center)).collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));
        assert!(left.iter().all(|c| c.x == -1));
    }

    #[test]
    fn death_reset_gets_a_fresh_spawn_not_a_snap_back() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::legacy(7));
        // Walk out in legal steps until well past the reset distance.
        for _ in 0..6 {
            let prev = session.handle.position().0;
            session.handle_packet(&move_to(standing(prev.x + 7.0, prev.z + 7.0)));
            session.take_outbox();
        }
        let far = session.handle.position().0;
        assert!(horizontal_dist_sq(far) > DEATH_RESET_MIN_DIST * DEATH_RESET_MIN_DIST);

        session.handle_packet(&move_to(Position::new(0.5, 65.0 + EYE_HEIGHT, 0.5)));
        let outbox = session.take_outbox();
        let teleport = outbox
            .iter()
            .find_map(|p| match p {
                Packet::PositionLook(t) => Some(t.pos),
                _ => None,
            })
            .unwrap();
        let spawn = default_spawn(&ts.state.world);
        assert_eq!(teleport, spawn);
        assert_eq!(session.handle.position().0, spawn);
    }

    #[test]
    fn long_fall_rescues_old_dialects() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::legacy(7));
        let start = session.handle.position().0;
        // Teleport-free descent in 5-block steps, never on ground.
        let mut y = start.y;
        let mut rescued = None;
        for _ in 0..10 {
            y -= 5.0;
            session.handle_packet(
                &PlayerPosition {
                    pos: Position::new(start.x, y, start.z),
                    on_ground: false,
                }
                .into(),
            );
            let outbox = session.take_outbox();
            if let Some(Packet::PositionLook(p)) = outbox.first() {
                rescued = Some(p.pos);
                break;
            }
        }
        let rescue = rescued.expect("no rescue teleport");
        assert_eq!(rescue.y, 61.0 + EYE_HEIGHT);
        assert_eq!(session.handle.position().0, rescue);
    }

    #[test]
    fn landing_resets_fall_tracking() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::legacy(7));
        let start = session.handle.position().0;
        let mut y = start.y;
        for step in 0..12 {
            y -= 3.0;
            let on_ground = step % 4 == 3;
            session.handle_packet(
                &PlayerPosition {
                    pos: Position::new(start.x, y, start.z),
                    on_ground,
                }
                .into(),
            );
            let outbox = session.take_outbox();
            assert!(
                !outbox.iter().any(|p| matches!(p, Packet::PositionLook(_))),
                "rescued on step {step}"
            );
        }
    }

    #[test]
    fn modern_dialects_handle_their_own_falls() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let start = session.handle.position().0;
        let mut y = start.y;
        for _ in 0..10 {
            y -= 5.0;
            session.handle_packet(
                &PlayerPosition {
                    pos: Position::new(start.x, y, start.z),
                    on_ground: false,
                }
                .into(),
            );
            assert!(session.take_outbox().is_empty());
        }
    }

    #[test]
    fn placement_into_own_box_is_corrected() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        let feet = session.handle.position().0.feet_block();
        // Clicking the block below pushes the target into the feet cell.
        session.handle_packet(
            &BlockPlace {
                pos: BlockPos::new(feet.x, feet.y - 1, feet.z),
                face: Some(BlockFace::Up),
                held: Some(ItemStack::new(1, 64, 0)),
            }
            .into(),
        );
        let outbox = session.take_outbox();
        match &outbox[..] {
            [Packet::BlockChange(c)] => {
                assert_eq!(c.pos, feet);
                assert_eq!(c.block_id, block::AIR);
            }
            other => panic!("expected corrective air, got {other:?}"),
        }
        assert_eq!(ts.state.world.block(feet), block::AIR);
        assert!(drain_bus(&mut bus).is_empty());
    }

    #[test]
    fn placement_outside_world_bounds_is_corrected() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        session.handle_packet(
            &BlockPlace {
                pos: BlockPos::new(30, 127, 8),
                face: Some(BlockFace::Up),
                held: Some(ItemStack::new(1, 64, 0)),
            }
            .into(),
        );
        let outbox = session.take_outbox();
        assert!(
            matches!(&outbox[..], [Packet::BlockChange(c)] if c.block_id == block::AIR)
        );
    }

    #[tokio::test]
    async fn accepted_placement_mutates_and_broadcasts_to_all() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        let target = BlockPos::new(20, 61, 8);
        session.handle_packet(
            &BlockPlace {
                pos: BlockPos::new(20, 60, 8),
                face: Some(BlockFace::Up),
                held: Some(ItemStack::new(12, 64, 0)),
            }
            .into(),
        );
        assert_eq!(ts.state.world.block(target), block::SAND);
        // The echo reaches the placer through the bus, not the outbox.
        assert!(session.take_outbox().is_empty());
        let events = drain_bus(&mut bus);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, None);
        assert!(
            matches!(&events[0].packet, Packet::BlockChange(c) if c.pos == target && c.block_id == block::SAND)
        );
    }

    #[test]
    fn occupied_target_returns_the_real_block() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let target = BlockPos::new(20, 60, 8);
        session.handle_packet(
            &BlockPlace {
                pos: BlockPos::new(20, 59, 8),
                face: Some(BlockFace::Up),
                held: Some(ItemStack::new(1, 64, 0)),
            }
            .into(),
        );
        let outbox = session.take_outbox();
        assert!(
            matches!(&outbox[..], [Packet::BlockChange(c)] if c.pos == target && c.block_id == block::GRASS)
        );
    }

    #[test]
    fn dig_clears_and_broadcasts() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        let target = BlockPos::new(3, 60, 3);
        session.handle_packet(
            &BlockDig {
                status: DigStatus::Finished,
                pos: target,
                face: BlockFace::Up,
            }
            .into(),
        );
        assert_eq!(ts.state.world.block(target), block::AIR);
        let events = drain_bus(&mut bus);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, None);
    }

    #[tokio::test(start_paused = true)]
    async fn old_dialect_dig_reveals_after_delay() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::legacy(14));
        let mut bus = ts.state.bus.subscribe();
        let target = BlockPos::new(3, 60, 3);
        session.handle_packet(
            &BlockDig {
                status: DigStatus::Started,
                pos: target,
                face: BlockFace::Up,
            }
            .into(),
        );
        assert_eq!(ts.state.world.block(target), block::GRASS);

        tokio::time::sleep(REVEAL_DELAY + Duration::from_millis(50)).await;
        assert_eq!(ts.state.world.block(target), block::AIR);
        let events = drain_bus(&mut bus);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_dig_keeps_the_block() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::legacy(14));
        let target = BlockPos::new(3, 60, 3);
        session.handle_packet(
            &BlockDig {
                status: DigStatus::Started,
                pos: target,
                face: BlockFace::Up,
            }
            .into(),
        );
        session.handle_packet(
            &BlockDig {
                status: DigStatus::Cancelled,
                pos: target,
                face: BlockFace::Up,
            }
            .into(),
        );
        tokio::time::sleep(REVEAL_DELAY * 2).await;
        assert_eq!(ts.state.world.block(target), block::GRASS);
    }

    fn place_at(x: i32, z: i32) -> Packet {
        BlockPlace {
            pos: BlockPos::new(x, 60, z),
            face: Some(BlockFace::Up),
            held: Some(ItemStack::new(12, 64, 0)),
        }
        .into()
    }

    #[tokio::test(start_paused = true)]
    async fn replenish_coalesces_to_one_send_timed_from_the_last() {
        let ts = small_state();
        let (mut session, mut rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        for i in 0..3 {
            session.handle_packet(&place_at(20 + i, 8));
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        // Last placement at t=200ms; a top-up timed from the first
        // would have fired by now.
        tokio::time::advance(Duration::from_millis(240)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        let packet = rx.recv().await.unwrap();
        match packet {
            Packet::SetSlot(slot) => {
                assert_eq!(slot.window_id, 0);
                assert_eq!(slot.slot, HOTBAR_SLOT_OFFSET);
                assert_eq!(slot.item, Some(ItemStack::new(12, FULL_STACK, 0)));
            }
            other => panic!("expected slot top-up, got {other:?}"),
        }
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err(), "one burst, one send");
    }

    #[tokio::test(start_paused = true)]
    async fn replenish_follows_the_held_slot_report() {
        let ts = small_state();
        let (mut session, mut rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        session.handle_packet(&HeldItemChange { slot: 3 }.into());
        session.handle_packet(
            &CreativeSlot {
                slot: HOTBAR_SLOT_OFFSET + 3,
                item: Some(ItemStack::new(3, 64, 0)),
            }
            .into(),
        );
        session.handle_packet(
            &BlockPlace {
                pos: BlockPos::new(20, 60, 8),
                face: Some(BlockFace::Up),
                held: Some(ItemStack::new(3, 64, 0)),
            }
            .into(),
        );
        let packet = rx.recv().await.unwrap();
        assert!(
            matches!(packet, Packet::SetSlot(s) if s.slot == HOTBAR_SLOT_OFFSET + 3
                && s.item == Some(ItemStack::new(3, FULL_STACK, 0)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn classic_placements_schedule_no_replenish() {
        let ts = small_state();
        let (mut session, mut rx) = joined(&ts, "alice", ProtocolVersion::CLASSIC);
        session.handle_packet(
            &ClassicSetBlock {
                x: 20,
                y: 61,
                z: 8,
                mode: 1,
                block: 12,
            }
            .into(),
        );
        assert_eq!(
            ts.state.world.block(BlockPos::new(20, 61, 8)),
            block::SAND
        );
        tokio::time::sleep(REPLENISH_DELAY * 3).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn classic_level_transfer_replaces_the_chunk_stream() {
        let ts = small_state();
        let mut bus = ts.state.bus.subscribe();
        let (mut session, _rx) = join(&ts, "alice", ProtocolVersion::CLASSIC);
        session.run_join().unwrap();
        let outbox = session.take_outbox();

        assert!(matches!(outbox[0], Packet::SpawnPosition(_)));
        assert!(matches!(outbox[1], Packet::ClassicLevelInit(_)));
        assert!(!outbox.iter().any(|p| matches!(p, Packet::ChunkData(_))));

        let mut payload = Vec::new();
        let mut finalized = false;
        for packet in &outbox[2..] {
            match packet {
                Packet::ClassicLevelChunk(piece) => {
                    assert!(!finalized);
                    payload.extend_from_slice(&piece.data);
                }
                Packet::ClassicLevelFinalize(done) => {
                    assert_eq!((done.x_size, done.y_size, done.z_size), (128, 128, 128));
                    finalized = true;
                }
                Packet::PositionLook(_) => assert!(finalized),
                other => panic!("unexpected packet {other:?}"),
            }
        }
        assert!(finalized);

        let mut raw = Vec::new();
        GzDecoder::new(&payload[..]).read_to_end(&mut raw).unwrap();
        let volume = 128 * 128 * 128;
        assert_eq!(&raw[..4], &(volume as u32).to_be_bytes());
        let blocks = &raw[4..];
        assert_eq!(blocks.len(), volume);
        // y-z-x order: bedrock floor, grass at the flat surface.
        assert_eq!(blocks[0], block::BEDROCK);
        assert_eq!(blocks[(60 * 128 + 5) * 128 + 9], block::GRASS);
        assert_eq!(blocks[(61 * 128 + 5) * 128 + 9], block::AIR);

        // The announcement broadcasts still go out for classic joins.
        let events = drain_bus(&mut bus);
        assert!(events
            .iter()
            .any(|e| matches!(e.packet, Packet::SpawnPlayer(_))));
    }

    #[test]
    fn chat_is_broadcast_with_the_speaker_name() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        session.handle_packet(
            &Chat {
                message: "  hello there  ".into(),
            }
            .into(),
        );
        let events = drain_bus(&mut bus);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, None);
        assert!(
            matches!(&events[0].packet, Packet::Chat(c) if c.message == "<alice> hello there")
        );
    }

    #[test]
    fn commands_get_a_reply_and_no_broadcast() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        session.handle_packet(
            &Chat {
                message: "/warp home".into(),
            }
            .into(),
        );
        let outbox = session.take_outbox();
        assert!(
            matches!(&outbox[..], [Packet::Chat(c)] if c.message == "Unknown command.")
        );
        assert!(drain_bus(&mut bus).is_empty());
    }

    #[test]
    fn disconnect_packet_closes_the_flow() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let flow = session.handle_packet(
            &Disconnect {
                reason: "quitting".into(),
            }
            .into(),
        );
        assert_eq!(flow, Flow::Closed);
        assert_eq!(
            session.handle_packet(&KeepAlive { id: 1 }.into()),
            Flow::Continue
        );
    }

    #[test]
    fn teardown_persists_frees_and_announces() {
        let ts = small_state();
        let (mut session, _rx) = joined(&ts, "alice", ProtocolVersion::NATIVE);
        let mut bus = ts.state.bus.subscribe();
        let spot = standing(12.0, 4.0);
        session.handle_packet(&move_to(spot));
        drain_bus(&mut bus);

        let id = session.handle.id;
        session.teardown();
        assert_eq!(ts.state.players.count(), 0);
        let (restored, _) = ts.state.positions.recall("alice").unwrap();
        assert!((restored.x - spot.x).abs() <= 1.0 / 32.0);

        let events = drain_bus(&mut bus);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0].packet, Packet::DespawnPlayer(ref d) if d.player_id == id));
        assert!(
            matches!(&events[1].packet, Packet::PlayerListItem(t) if !t.online)
        );
        assert!(matches!(events[2].packet, Packet::Chat(_)));
    }

    #[test]
    fn spawn_resolution_prefers_persisted_position() {
        let ts = small_state();
        let spot = standing(30.25, -7.5);
        let look = Look::new(45.0, 10.0);
        ts.state.positions.store("alice", spot, look).unwrap();
        let (pos, restored_look) = resolve_spawn(&ts.state, "alice");
        assert!((pos.x - spot.x).abs() <= 1.0 / 32.0);
        assert!((pos.y - spot.y).abs() <= 1.0 / 32.0);
        assert!((restored_look.yaw - 45.0).abs() <= 360.0 / 256.0);
    }

    #[test]
    fn buried_spawn_is_lifted_to_open_air() {
        let ts = small_state();
        // Persist a position inside the dirt layer.
        ts.state
            .positions
            .store("alice", Position::new(5.5, 20.0, 5.5), Look::default())
            .unwrap();
        let (pos, _) = resolve_spawn(&ts.state, "alice");
        assert_eq!(pos.feet_block().y, 61);
        assert_eq!(pos.x, 5.5);
    }

    #[test]
    fn fresh_join_uses_the_default_column() {
        let ts = small_state();
        let (pos, look) = resolve_spawn(&ts.state, "newcomer");
        assert_eq!(pos, Position::new(8.5, 61.0 + EYE_HEIGHT, 8.5));
        assert_eq!(look, Look::default());
    }

    #[test]
    fn username_validation() {
        assert!(validate_username("alice"));
        assert!(validate_username("Alice_99"));
        assert!(!validate_username(""));
        assert!(!validate_username("a name"));
        assert!(!validate_username("seventeen_letters_"));
        assert!(!validate_username("tab\tchar"));
    }
}
