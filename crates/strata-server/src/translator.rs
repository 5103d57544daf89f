//! Canonical-to-wire translation.
//!
//! Every packet a connection writes passes through its [`Translator`]
//! first. Canonical events are expressed in the native dialect; here
//! they become whatever the destination era can carry: unchanged, in a
//! different packet shape, expanded to several packets, or nothing at
//! all. An empty result is the normal fate of events an era has no
//! concept for, never an error.
//!
//! Field layout differences (fixed-point coordinates, string encodings,
//! entity id offsets) live in the packet codecs, keyed by the version
//! the connection writes with. This module only decides *which* packets
//! exist per era and remaps block ids through the [`BlockMapper`].

use std::sync::Arc;

use bytes::Bytes;

use strata_proto::packets::{BlockChange, ChunkData, ClassicPing, PreChunk};
use strata_proto::{Packet, ProtocolVersion};

use crate::mapping::BlockMapper;

/// Block extent of the Classic level cube on each axis.
pub const CLASSIC_EXTENT: i32 = 128;

pub struct Translator {
    version: ProtocolVersion,
    mapper: Arc<dyn BlockMapper>,
}

impl Translator {
    pub fn new(version: ProtocolVersion, mapper: Arc<dyn BlockMapper>) -> Self {
        Self { version, mapper }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Translate one canonical packet into this connection's dialect.
    pub fn translate(&self, packet: &Packet) -> Vec<Packet> {
        let v = self.version;
        match packet {
            Packet::KeepAlive(p) => {
                if v.is_classic() {
                    vec![ClassicPing.into()]
                } else {
                    vec![p.clone().into()]
                }
            }
            Packet::TimeUpdate(p) => {
                if v.is_classic() {
                    vec![]
                } else {
                    vec![p.clone().into()]
                }
            }
            Packet::SpawnPosition(p) => {
                if v.is_classic() {
                    vec![]
                } else {
                    vec![p.clone().into()]
                }
            }
            Packet::SetSlot(p) => {
                if v.has_inventory() {
                    vec![p.clone().into()]
                } else {
                    vec![]
                }
            }
            Packet::PlayerListItem(p) => {
                if v.has_tab_list() {
                    vec![p.clone().into()]
                } else {
                    vec![]
                }
            }
            Packet::SwingArm(p) => {
                if v.is_classic() {
                    vec![]
                } else {
                    vec![p.clone().into()]
                }
            }
            Packet::JoinGame(p) => {
                if v.is_framed() {
                    vec![p.clone().into()]
                } else {
                    vec![]
                }
            }
            Packet::ChunkData(p) => {
                if v.is_classic() {
                    // Classic gets the one-shot level transfer instead.
                    vec![]
                } else if v.is_framed() {
                    vec![self.remap_column(p).into()]
                } else {
                    vec![
                        PreChunk {
                            pos: p.pos,
                            load: true,
                        }
                        .into(),
                        self.remap_column(p).into(),
                    ]
                }
            }
            Packet::ChunkUnload(p) => {
                if v.is_classic() {
                    vec![]
                } else if v.is_framed() {
                    vec![p.clone().into()]
                } else {
                    vec![PreChunk {
                        pos: p.pos,
                        load: false,
                    }
                    .into()]
                }
            }
            Packet::PreChunk(p) => {
                if v.is_classic() || v.is_framed() {
                    vec![]
                } else {
                    vec![p.clone().into()]
                }
            }
            Packet::BlockChange(p) => {
                if v.is_classic() && !in_classic_level(p) {
                    return vec![];
                }
                vec![BlockChange {
                    pos: p.pos,
                    block_id: self.mapper.map(p.block_id),
                    meta: p.meta,
                }
                .into()]
            }
            // Everything else either has a codec for every era
            // (teleports, spawns, chat, disconnects) or is only ever
            // sent to the era that produced it (login replies, level
            // transfer pieces).
            other => vec![other.clone()],
        }
    }

    fn remap_column(&self, column: &ChunkData) -> ChunkData {
        if self.version == ProtocolVersion::NATIVE {
            return column.clone();
        }
        let mut blocks = column.blocks.to_vec();
        self.mapper.map_all(&mut blocks);
        ChunkData {
            pos: column.pos,
            blocks: Bytes::from(blocks),
        }
    }
}

fn in_classic_level(change: &BlockChange) -> bool {
    let p = change.pos;
    (0..CLASSIC_EXTENT).contains(&p.x)
        && (0..CLASSIC_EXTENT).contains(&p.y)
        && (0..CLASSIC_EXTENT).contains(&p.z)
}
