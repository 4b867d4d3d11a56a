//! MBR partition records and CHS addressing

use std::fmt;

/// MBR partition type byte
///
/// Only the types this tool emits or recognises get names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsType(pub u8);

impl OsType {
    /// Empty/unused partition record
    pub const EMPTY: Self = Self(0x00);

    /// GPT protective partition
    pub const GPT_PROTECTIVE: Self = Self(0xEE);

    /// EFI system partition
    pub const EFI_SYSTEM: Self = Self(0xEF);

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &str {
        match *self {
            Self::EMPTY => "Empty",
            Self::GPT_PROTECTIVE => "GPT Protective",
            Self::EFI_SYSTEM => "EFI System",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.0)
    }
}

/// CHS (Cylinder-Head-Sector) address
///
/// Legacy geometry addressing. Maximum values: 1023 cylinders, 255 heads,
/// 63 sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CHSAddress {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

impl CHSAddress {
    /// Start of a protective partition (C:0/H:0/S:2, i.e. LBA 1)
    pub const PROTECTIVE_START: Self = Self {
        cylinder: 0,
        head: 0,
        sector: 2,
    };

    /// Saturated address used when the real end is not representable
    pub const SATURATED: Self = Self {
        cylinder: 1023,
        head: 255,
        sector: 63,
    };

    /// Parse CHS address from 3 bytes
    ///
    /// Format:
    /// - Byte 0: Head (0-255)
    /// - Byte 1: Sector (bits 0-5) + Cylinder high (bits 6-7)
    /// - Byte 2: Cylinder low (bits 0-7)
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let head = bytes[0];
        let sector = bytes[1] & 0x3F;
        let cyl_high = ((bytes[1] & 0xC0) as u16) << 2;
        let cylinder = cyl_high | bytes[2] as u16;

        Self {
            cylinder,
            head,
            sector,
        }
    }

    /// Convert CHS to bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        let cyl_high = ((self.cylinder >> 8) & 0x03) as u8;
        let cyl_low = (self.cylinder & 0xFF) as u8;

        [self.head, (self.sector & 0x3F) | (cyl_high << 6), cyl_low]
    }
}

impl fmt::Display for CHSAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/H:{}/S:{}", self.cylinder, self.head, self.sector)
    }
}

/// One 16-byte MBR partition record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRecord {
    /// 0x80 for the active partition, 0x00 otherwise
    pub boot_indicator: u8,
    pub starting_chs: CHSAddress,
    pub os_type: OsType,
    pub ending_chs: CHSAddress,
    pub starting_lba: u32,
    pub size_in_lba: u32,
}

impl PartitionRecord {
    /// Size of a partition record in bytes
    pub const SIZE: usize = 16;

    /// An all-zero record
    pub const EMPTY: Self = Self {
        boot_indicator: 0,
        starting_chs: CHSAddress {
            cylinder: 0,
            head: 0,
            sector: 0,
        },
        os_type: OsType::EMPTY,
        ending_chs: CHSAddress {
            cylinder: 0,
            head: 0,
            sector: 0,
        },
        starting_lba: 0,
        size_in_lba: 0,
    };

    /// Record covering a GPT disk of `disk_sectors` sectors
    ///
    /// The size saturates at `0xFFFFFFFF` when the disk is too large for a
    /// 32-bit sector count.
    pub fn protective(disk_sectors: u64) -> Self {
        let size_in_lba = disk_sectors.saturating_sub(1).min(u32::MAX as u64) as u32;

        Self {
            boot_indicator: 0,
            starting_chs: CHSAddress::PROTECTIVE_START,
            os_type: OsType::GPT_PROTECTIVE,
            ending_chs: CHSAddress::SATURATED,
            starting_lba: 1,
            size_in_lba,
        }
    }

    /// Parse a record from its 16 on-disk bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            boot_indicator: bytes[0],
            starting_chs: CHSAddress::from_bytes(&bytes[1..4]),
            os_type: OsType(bytes[4]),
            ending_chs: CHSAddress::from_bytes(&bytes[5..8]),
            starting_lba: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            size_in_lba: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    /// Encode the record in its 16 on-disk bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.boot_indicator;
        out[1..4].copy_from_slice(&self.starting_chs.to_bytes());
        out[4] = self.os_type.0;
        out[5..8].copy_from_slice(&self.ending_chs.to_bytes());
        out[8..12].copy_from_slice(&self.starting_lba.to_le_bytes());
        out[12..16].copy_from_slice(&self.size_in_lba.to_le_bytes());
        out
    }

    /// True if every field is zero
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}
