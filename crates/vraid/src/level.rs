use core::fmt;
use core::str::FromStr;

/// RAID levels supported by the engine.
///
/// The discriminants double as the on-disk level tags, so they must not be
/// reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RaidLevel {
    /// Striping, no redundancy.
    Raid0 = 0,
    /// Mirroring across disk halves.
    Raid1 = 1,
    /// Striped mirrors.
    Raid01 = 2,
    /// Striping with a dedicated parity disk.
    Raid4 = 3,
    /// Striping with rotating parity.
    Raid5 = 4,
}

impl RaidLevel {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Raid0),
            1 => Some(Self::Raid1),
            2 => Some(Self::Raid01),
            3 => Some(Self::Raid4),
            4 => Some(Self::Raid5),
            _ => None,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }

    /// Whether this level can serve reads around a single broken disk.
    pub fn has_redundancy(self) -> bool {
        !matches!(self, Self::Raid0)
    }

    /// Whether this level maintains XOR parity (and therefore takes the
    /// parity serializer on its I/O paths).
    pub fn uses_parity(self) -> bool {
        matches!(self, Self::Raid4 | Self::Raid5)
    }

    /// Shape constraints: mirrored levels need an even disk count, striped
    /// mirrors at least four disks, parity levels at least three.
    pub fn fits_disk_count(self, disks: u32) -> bool {
        match self {
            Self::Raid0 => disks >= 1,
            Self::Raid1 => disks % 2 == 0,
            Self::Raid01 => disks % 2 == 0 && disks >= 4,
            Self::Raid4 | Self::Raid5 => disks >= 3,
        }
    }
}

impl fmt::Display for RaidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raid0 => "raid0",
            Self::Raid1 => "raid1",
            Self::Raid01 => "raid01",
            Self::Raid4 => "raid4",
            Self::Raid5 => "raid5",
        };
        f.write_str(name)
    }
}

impl FromStr for RaidLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raid0" | "0" => Ok(Self::Raid0),
            "raid1" | "1" => Ok(Self::Raid1),
            "raid01" | "raid0+1" | "01" => Ok(Self::Raid01),
            "raid4" | "4" => Ok(Self::Raid4),
            "raid5" | "5" => Ok(Self::Raid5),
            _ => Err(UnknownLevel),
        }
    }
}

/// Error parsing a [`RaidLevel`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown raid level, expected raid0/raid1/raid01/raid4/raid5")]
pub struct UnknownLevel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip() {
        for level in [
            RaidLevel::Raid0,
            RaidLevel::Raid1,
            RaidLevel::Raid01,
            RaidLevel::Raid4,
            RaidLevel::Raid5,
        ] {
            assert_eq!(RaidLevel::from_u32(level.to_u32()), Some(level));
        }
        assert_eq!(RaidLevel::from_u32(5), None);
    }

    #[test]
    fn shape_constraints() {
        assert!(RaidLevel::Raid0.fits_disk_count(1));
        assert!(RaidLevel::Raid1.fits_disk_count(2));
        assert!(!RaidLevel::Raid1.fits_disk_count(3));
        assert!(!RaidLevel::Raid01.fits_disk_count(2));
        assert!(RaidLevel::Raid01.fits_disk_count(4));
        assert!(!RaidLevel::Raid4.fits_disk_count(2));
        assert!(RaidLevel::Raid5.fits_disk_count(3));
    }

    #[test]
    fn parse_names() {
        assert_eq!("raid0+1".parse::<RaidLevel>(), Ok(RaidLevel::Raid01));
        assert_eq!("RAID5".parse::<RaidLevel>(), Ok(RaidLevel::Raid5));
        assert!("raid6".parse::<RaidLevel>().is_err());
    }
}
