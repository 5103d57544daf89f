//! Protocol families, dialect versions, connection states.
//!
//! Era logic never compares raw numbers: it goes through the named
//! constants and [`ProtocolVersion::at_least`], which orders family first
//! (every framed dialect is newer than every legacy one).

use std::fmt;

use crate::error::ProtoError;

/// The two structurally distinct wire framings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolFamily {
    /// Raw TCP, one id byte per packet, no length prefix. Version 0 is the
    /// Classic dialect; 7..=78 are the beta/release era.
    Legacy,
    /// The server's native protocol: VarInt length frames, ids scoped by
    /// connection state.
    Framed,
}

/// A concrete dialect a client can speak.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub family: ProtocolFamily,
    pub number: i32,
}

impl ProtocolVersion {
    pub const fn legacy(number: i32) -> Self {
        Self {
            family: ProtocolFamily::Legacy,
            number,
        }
    }

    pub const fn framed(number: i32) -> Self {
        Self {
            family: ProtocolFamily::Framed,
            number,
        }
    }

    /// The Classic dialect: padded strings, i16 fixed-point, no inventory.
    pub const CLASSIC: Self = Self::legacy(0);
    /// Oldest beta-era dialect.
    pub const LEGACY_7: Self = Self::legacy(7);
    /// Last beta-era dialect.
    pub const LEGACY_17: Self = Self::legacy(17);
    /// First release-era dialect: extended login layout, keep-alive ids,
    /// client fall-damage reporting, creative slot reports.
    pub const LEGACY_23: Self = Self::legacy(23);
    /// Tab list, four-field handshake, two-field time update.
    pub const LEGACY_39: Self = Self::legacy(39);
    /// Newest legacy dialect.
    pub const LEGACY_78: Self = Self::legacy(78);
    /// Oldest framed dialect: split block positions, stance field.
    pub const FRAMED_4: Self = Self::framed(4);
    pub const FRAMED_5: Self = Self::framed(5);
    /// Packed block positions, raw-uuid spawn, flags-style teleports.
    pub const FRAMED_47: Self = Self::framed(47);
    /// The dialect canonical packets are expressed in.
    pub const NATIVE: Self = Self::FRAMED_47;

    /// "This dialect or anything newer." The workhorse of every era branch.
    pub fn at_least(self, other: Self) -> bool {
        self >= other
    }

    /// Classic is the only dialect without an inventory.
    pub fn has_inventory(self) -> bool {
        self.at_least(Self::LEGACY_7)
    }

    /// The tab-list packet exists from legacy 39 on.
    pub fn has_tab_list(self) -> bool {
        self.at_least(Self::LEGACY_39)
    }

    /// Dialects that apply their own fall damage. Older clients get
    /// server-side fall bookkeeping and rescue teleports instead.
    pub fn reports_fall_damage(self) -> bool {
        self.at_least(Self::LEGACY_23)
    }

    /// Keep-alive packets carry an id from legacy 23 on.
    pub fn keep_alive_has_id(self) -> bool {
        self.at_least(Self::LEGACY_23)
    }

    /// Dialects that send a finished-digging status. Older clients only
    /// announce the start, so block removal is revealed on a timer.
    pub fn reports_dig_completion(self) -> bool {
        self.at_least(Self::LEGACY_23)
    }

    pub fn is_classic(self) -> bool {
        self == Self::CLASSIC
    }

    pub fn is_framed(self) -> bool {
        self.family == ProtocolFamily::Framed
    }

    /// Human-readable client generation, for logs and the status screen.
    pub fn display_name(self) -> &'static str {
        match (self.family, self.number) {
            (ProtocolFamily::Legacy, 0) => "c0.30",
            (ProtocolFamily::Legacy, 7) => "b1.1",
            (ProtocolFamily::Legacy, 8) => "b1.2",
            (ProtocolFamily::Legacy, 9) => "b1.3",
            (ProtocolFamily::Legacy, 10) => "b1.4",
            (ProtocolFamily::Legacy, 11) => "b1.5",
            (ProtocolFamily::Legacy, 14) => "b1.7.3",
            (ProtocolFamily::Legacy, 17) => "b1.8.1",
            (ProtocolFamily::Legacy, 23) => "1.1",
            (ProtocolFamily::Legacy, 28) => "1.2.3",
            (ProtocolFamily::Legacy, 29) => "1.2.5",
            (ProtocolFamily::Legacy, 39) => "1.3.2",
            (ProtocolFamily::Legacy, 51) => "1.4.7",
            (ProtocolFamily::Legacy, 60) => "1.5.1",
            (ProtocolFamily::Legacy, 61) => "1.5.2",
            (ProtocolFamily::Legacy, 73) => "1.6.1",
            (ProtocolFamily::Legacy, 78) => "1.6.4",
            (ProtocolFamily::Framed, 4) => "1.7.5",
            (ProtocolFamily::Framed, 5) => "1.7.10",
            (ProtocolFamily::Framed, 47) => "1.8.8",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.family {
            ProtocolFamily::Legacy => "legacy",
            ProtocolFamily::Framed => "framed",
        };
        write!(f, "{}/{} ({})", family, self.number, self.display_name())
    }
}

impl fmt::Debug for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Every dialect the server accepts, oldest first.
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 20] = [
    ProtocolVersion::CLASSIC,
    ProtocolVersion::legacy(7),
    ProtocolVersion::legacy(8),
    ProtocolVersion::legacy(9),
    ProtocolVersion::legacy(10),
    ProtocolVersion::legacy(11),
    ProtocolVersion::legacy(14),
    ProtocolVersion::legacy(17),
    ProtocolVersion::legacy(23),
    ProtocolVersion::legacy(28),
    ProtocolVersion::legacy(29),
    ProtocolVersion::legacy(39),
    ProtocolVersion::legacy(51),
    ProtocolVersion::legacy(60),
    ProtocolVersion::legacy(61),
    ProtocolVersion::legacy(73),
    ProtocolVersion::legacy(78),
    ProtocolVersion::framed(4),
    ProtocolVersion::framed(5),
    ProtocolVersion::framed(47),
];

pub fn is_supported(version: ProtocolVersion) -> bool {
    SUPPORTED_VERSIONS.contains(&version)
}

/// Framed-family connection states. Packet ids are scoped per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshaking,
    Status,
    Login,
    Play,
}

impl ConnectionState {
    /// Map the handshake's next-state field.
    pub fn from_next_state(raw: i32) -> Result<Self, ProtoError> {
        match raw {
            1 => Ok(Self::Status),
            2 => Ok(Self::Login),
            other => Err(ProtoError::InvalidNextState(other)),
        }
    }
}

/// Which peer a packet travels toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Serverbound,
    Clientbound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_orders_before_number() {
        assert!(ProtocolVersion::FRAMED_4 > ProtocolVersion::LEGACY_78);
        assert!(ProtocolVersion::LEGACY_7 > ProtocolVersion::CLASSIC);
        assert!(ProtocolVersion::FRAMED_47 > ProtocolVersion::FRAMED_5);
    }

    #[test]
    fn at_least_spans_families() {
        // Tab list exists for legacy 39+ and every framed dialect.
        assert!(!ProtocolVersion::LEGACY_23.has_tab_list());
        assert!(ProtocolVersion::LEGACY_39.has_tab_list());
        assert!(ProtocolVersion::FRAMED_4.has_tab_list());
    }

    #[test]
    fn classic_capabilities() {
        assert!(ProtocolVersion::CLASSIC.is_classic());
        assert!(!ProtocolVersion::CLASSIC.has_inventory());
        assert!(!ProtocolVersion::CLASSIC.reports_fall_damage());
        assert!(ProtocolVersion::LEGACY_7.has_inventory());
    }

    #[test]
    fn supported_set() {
        assert_eq!(SUPPORTED_VERSIONS.len(), 20);
        assert!(is_supported(ProtocolVersion::legacy(14)));
        assert!(is_supported(ProtocolVersion::framed(47)));
        assert!(!is_supported(ProtocolVersion::legacy(6)));
        assert!(!is_supported(ProtocolVersion::framed(48)));
    }

    #[test]
    fn display_names() {
        assert_eq!(ProtocolVersion::legacy(14).display_name(), "b1.7.3");
        assert_eq!(ProtocolVersion::framed(47).display_name(), "1.8.8");
        assert_eq!(ProtocolVersion::legacy(6).display_name(), "unknown");
    }

    #[test]
    fn next_state_mapping() {
        assert_eq!(
            ConnectionState::from_next_state(1).unwrap(),
            ConnectionState::Status
        );
        assert_eq!(
            ConnectionState::from_next_state(2).unwrap(),
            ConnectionState::Login
        );
        assert!(ConnectionState::from_next_state(3).is_err());
    }
}
