//! Block id mapping per destination era.
//!
//! Outbound block ids must exist in the receiving client's palette or
//! the client renders garbage (or crashes, on the oldest dialects). The
//! mapper decides validity and picks a lookalike for ids from after the
//! destination's era. Full per-state mapping tables are an external
//! concern; [`EraBlockMapper`] is the shipped passthrough-with-fallback
//! implementation.

use std::fmt::Debug;

use strata_proto::ProtocolVersion;
use strata_world::block;

pub trait BlockMapper: Debug + Send + Sync {
    /// Map a canonical block id to the destination era's palette.
    fn map(&self, id: u8) -> u8;

    /// Whether a client of this era may place the given id.
    fn placeable(&self, id: u8) -> bool;

    fn map_all(&self, ids: &mut [u8]) {
        for id in ids.iter_mut() {
            *id = self.map(*id);
        }
    }
}

/// Highest block id each era's client knows how to render.
fn era_ceiling(version: ProtocolVersion) -> u8 {
    if version.is_classic() {
        49
    } else if version.is_framed() {
        178
    } else if version.at_least(ProtocolVersion::LEGACY_23) {
        145
    } else {
        96
    }
}

#[derive(Debug)]
pub struct EraBlockMapper {
    ceiling: u8,
}

impl EraBlockMapper {
    pub fn for_version(version: ProtocolVersion) -> Self {
        Self {
            ceiling: era_ceiling(version),
        }
    }
}

impl BlockMapper for EraBlockMapper {
    fn map(&self, id: u8) -> u8 {
        if id <= self.ceiling {
            return id;
        }
        // Lookalikes for the common post-era ids; everything else
        // shows as stone.
        match id {
            95 => block::GLASS,
            126 => block::PLANKS,
            _ => block::STONE,
        }
    }

    fn placeable(&self, id: u8) -> bool {
        id != block::AIR && id <= self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_era_passes_everything_through() {
        let mapper = EraBlockMapper::for_version(ProtocolVersion::NATIVE);
        for id in 0..=178u8 {
            assert_eq!(mapper.map(id), id);
        }
    }

    #[test]
    fn classic_downgrades_post_era_ids() {
        let mapper = EraBlockMapper::for_version(ProtocolVersion::CLASSIC);
        assert_eq!(mapper.map(block::SAND), block::SAND);
        assert_eq!(mapper.map(95), block::GLASS);
        assert_eq!(mapper.map(126), block::PLANKS);
        assert_eq!(mapper.map(150), block::STONE);
    }

    #[test]
    fn air_is_never_placeable() {
        let mapper = EraBlockMapper::for_version(ProtocolVersion::NATIVE);
        assert!(!mapper.placeable(block::AIR));
        assert!(mapper.placeable(block::STONE));
    }

    #[test]
    fn beta_rejects_release_only_ids() {
        let mapper = EraBlockMapper::for_version(ProtocolVersion::legacy(14));
        assert!(mapper.placeable(96));
        assert!(!mapper.placeable(97));
    }

    #[test]
    fn map_all_rewrites_in_place() {
        let mapper = EraBlockMapper::for_version(ProtocolVersion::CLASSIC);
        let mut ids = [block::STONE, 150, block::AIR];
        mapper.map_all(&mut ids);
        assert_eq!(ids, [block::STONE, block::STONE, block::AIR]);
    }
}
