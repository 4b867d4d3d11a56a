//! MBR (Master Boot Record) construction and parsing

pub mod types;

use partinit_core::{Error, Result};
use types::{OsType, PartitionRecord};

/// Boot stub used when no boot code is supplied
///
/// Prints "This is not a bootable disk" through BIOS teletype output and
/// halts. The rest of the boot code area is filled with `hlt` (0xF4).
pub const DEFAULT_BOOT_CODE: [u8; 46] = [
    0xbe, 0x12, 0x7c, 0xac, 0x3c, 0x00, 0x74, 0x06, 0xb4, 0x0e, 0xcd, 0x10, 0xeb, 0xf5, 0xfa, 0xf4,
    0xeb, 0xfc, 0x54, 0x68, 0x69, 0x73, 0x20, 0x69, 0x73, 0x20, 0x6e, 0x6f, 0x74, 0x20, 0x61, 0x20,
    0x62, 0x6f, 0x6f, 0x74, 0x61, 0x62, 0x6c, 0x65, 0x20, 0x64, 0x69, 0x73, 0x6b, 0x00,
];

/// Filler for the unused part of the boot code area
const BOOT_CODE_FILL: u8 = 0xF4;

/// Master Boot Record
///
/// # Structure
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0x000   424   Boot code
/// 0x1A8   16    Padding
/// 0x1B8   4     Disk signature
/// 0x1BC   2     Padding
/// 0x1BE   16    Partition record 1
/// 0x1CE   16    Partition record 2
/// 0x1DE   16    Partition record 3
/// 0x1EE   16    Partition record 4
/// 0x1FE   2     Boot signature (0x55 0xAA)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterBootRecord {
    pub boot_code: [u8; Self::BOOT_CODE_SIZE],
    pub disk_signature: u32,
    pub records: [PartitionRecord; Self::NUM_PARTITIONS],
}

impl MasterBootRecord {
    /// Size of the MBR in bytes (always 512)
    pub const MBR_SIZE: usize = 512;

    /// Size of the boot code area
    pub const BOOT_CODE_SIZE: usize = 424;

    /// Offset of the disk signature
    pub const DISK_SIGNATURE_OFFSET: usize = 0x1B8;

    /// Offset of the first partition record
    pub const PARTITION_TABLE_OFFSET: usize = 0x1BE;

    /// Offset of the boot signature
    pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;

    /// Boot signature bytes
    pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

    /// Number of partition records in the MBR
    pub const NUM_PARTITIONS: usize = 4;

    /// Protective MBR placed ahead of a GPT on a disk of `disk_sectors` sectors
    pub fn protective(disk_sectors: u64) -> Self {
        let mut records = [PartitionRecord::EMPTY; Self::NUM_PARTITIONS];
        records[0] = PartitionRecord::protective(disk_sectors);

        Self {
            boot_code: Self::default_boot_code(),
            disk_signature: 0,
            records,
        }
    }

    /// Standalone MBR with no partitions
    ///
    /// `boot_code` is copied to the start of the boot code area; without it
    /// the default stub is used.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `boot_code` exceeds 424 bytes.
    pub fn legacy(boot_code: Option<&[u8]>, disk_signature: u32) -> Result<Self> {
        let boot_code = match boot_code {
            Some(code) => {
                if code.len() > Self::BOOT_CODE_SIZE {
                    return Err(Error::validation(format!(
                        "Boot code is {} bytes, the MBR boot code area holds {}",
                        code.len(),
                        Self::BOOT_CODE_SIZE
                    )));
                }
                let mut area = [BOOT_CODE_FILL; Self::BOOT_CODE_SIZE];
                area[..code.len()].copy_from_slice(code);
                area
            }
            None => Self::default_boot_code(),
        };

        Ok(Self {
            boot_code,
            disk_signature,
            records: [PartitionRecord::EMPTY; Self::NUM_PARTITIONS],
        })
    }

    /// Parse an MBR from the first 512 bytes of `bytes`
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is short or the boot signature is missing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::MBR_SIZE {
            return Err(Error::invalid_table(format!(
                "MBR needs {} bytes, got {}",
                Self::MBR_SIZE,
                bytes.len()
            )));
        }

        let signature = [
            bytes[Self::BOOT_SIGNATURE_OFFSET],
            bytes[Self::BOOT_SIGNATURE_OFFSET + 1],
        ];
        if signature != Self::BOOT_SIGNATURE {
            return Err(Error::invalid_table(format!(
                "Invalid MBR boot signature: expected 55 AA, got {:02X} {:02X}",
                signature[0], signature[1]
            )));
        }

        let mut boot_code = [0u8; Self::BOOT_CODE_SIZE];
        boot_code.copy_from_slice(&bytes[..Self::BOOT_CODE_SIZE]);

        let off = Self::DISK_SIGNATURE_OFFSET;
        let disk_signature =
            u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);

        let mut records = [PartitionRecord::EMPTY; Self::NUM_PARTITIONS];
        for (i, record) in records.iter_mut().enumerate() {
            let start = Self::PARTITION_TABLE_OFFSET + i * PartitionRecord::SIZE;
            *record = PartitionRecord::from_bytes(&bytes[start..start + PartitionRecord::SIZE]);
        }

        Ok(Self {
            boot_code,
            disk_signature,
            records,
        })
    }

    /// Encode the MBR in its 512 on-disk bytes
    pub fn to_bytes(&self) -> [u8; Self::MBR_SIZE] {
        let mut out = [0u8; Self::MBR_SIZE];
        out[..Self::BOOT_CODE_SIZE].copy_from_slice(&self.boot_code);

        let off = Self::DISK_SIGNATURE_OFFSET;
        out[off..off + 4].copy_from_slice(&self.disk_signature.to_le_bytes());

        for (i, record) in self.records.iter().enumerate() {
            let start = Self::PARTITION_TABLE_OFFSET + i * PartitionRecord::SIZE;
            out[start..start + PartitionRecord::SIZE].copy_from_slice(&record.to_bytes());
        }

        out[Self::BOOT_SIGNATURE_OFFSET..].copy_from_slice(&Self::BOOT_SIGNATURE);
        out
    }

    /// Check whether record 0 is a GPT protective partition
    pub fn is_gpt_protective(&self) -> bool {
        self.records[0].os_type == OsType::GPT_PROTECTIVE && self.records[0].starting_lba == 1
    }

    fn default_boot_code() -> [u8; Self::BOOT_CODE_SIZE] {
        let mut area = [BOOT_CODE_FILL; Self::BOOT_CODE_SIZE];
        area[..DEFAULT_BOOT_CODE.len()].copy_from_slice(&DEFAULT_BOOT_CODE);
        area
    }
}
