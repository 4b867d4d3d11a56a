//! GPT header and partition entry structures

use partinit_core::checksum::crc32;
use partinit_core::{Error, Identifier, Result};

/// GPT partition entry
///
/// Each partition entry is 128 bytes and describes one partition on the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptPartitionEntry {
    /// Partition type GUID
    pub partition_type: Identifier,
    /// Unique partition GUID
    pub unique_guid: Identifier,
    /// First LBA (inclusive)
    pub first_lba: u64,
    /// Last LBA (inclusive)
    pub last_lba: u64,
    /// Attribute flags
    pub attributes: u64,
    /// Partition name (UTF-16LE code units, 36 units)
    pub name: [u16; 36],
}

impl GptPartitionEntry {
    /// Size of a partition entry in bytes
    pub const ENTRY_SIZE: usize = 128;

    /// An unused (all-zero) entry
    pub fn unused() -> Self {
        Self {
            partition_type: Identifier::NIL,
            unique_guid: Identifier::NIL,
            first_lba: 0,
            last_lba: 0,
            attributes: 0,
            name: [0; 36],
        }
    }

    /// Parse a partition entry from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::ENTRY_SIZE {
            return Err(Error::invalid_table(format!(
                "Partition entry needs {} bytes, got {}",
                Self::ENTRY_SIZE,
                bytes.len()
            )));
        }

        let mut name = [0u16; 36];
        for (i, unit) in name.iter_mut().enumerate() {
            *unit = u16::from_le_bytes([bytes[56 + i * 2], bytes[57 + i * 2]]);
        }

        Ok(Self {
            partition_type: Identifier::from_disk_bytes(guid_at(bytes, 0)),
            unique_guid: Identifier::from_disk_bytes(guid_at(bytes, 16)),
            first_lba: u64_at(bytes, 32),
            last_lba: u64_at(bytes, 40),
            attributes: u64_at(bytes, 48),
            name,
        })
    }

    /// Encode the entry in its 128 on-disk bytes
    pub fn to_bytes(&self) -> [u8; Self::ENTRY_SIZE] {
        let mut out = [0u8; Self::ENTRY_SIZE];
        out[0..16].copy_from_slice(&self.partition_type.to_disk_bytes());
        out[16..32].copy_from_slice(&self.unique_guid.to_disk_bytes());
        out[32..40].copy_from_slice(&self.first_lba.to_le_bytes());
        out[40..48].copy_from_slice(&self.last_lba.to_le_bytes());
        out[48..56].copy_from_slice(&self.attributes.to_le_bytes());
        for (i, unit) in self.name.iter().enumerate() {
            out[56 + i * 2..58 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        out
    }

    /// Check if this entry is unused
    pub fn is_unused(&self) -> bool {
        self.partition_type.is_nil()
    }
}

/// Serialized entry array of `count` unused entries
pub fn empty_entry_array(count: u32) -> Vec<u8> {
    let unused = GptPartitionEntry::unused().to_bytes();
    let mut array = Vec::with_capacity(count as usize * GptPartitionEntry::ENTRY_SIZE);
    for _ in 0..count {
        array.extend_from_slice(&unused);
    }
    array
}

/// GPT header
///
/// The GPT header contains metadata about the partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptHeader {
    /// Header signature ("EFI PART")
    pub signature: [u8; 8],
    /// GPT revision (0x00010000)
    pub revision: u32,
    /// Header size in bytes (92)
    pub header_size: u32,
    /// CRC32 checksum of header
    pub header_crc32: u32,
    /// Reserved (must be zero)
    pub reserved: u32,
    /// LBA of this header
    pub my_lba: u64,
    /// LBA of the mirror header
    pub alternate_lba: u64,
    /// First usable LBA for partitions
    pub first_usable_lba: u64,
    /// Last usable LBA for partitions
    pub last_usable_lba: u64,
    /// Disk GUID
    pub disk_guid: Identifier,
    /// Starting LBA of partition entries
    pub partition_entry_lba: u64,
    /// Number of partition entries
    pub num_partition_entries: u32,
    /// Size of each partition entry
    pub partition_entry_size: u32,
    /// CRC32 of partition entries array
    pub partition_entries_crc32: u32,
}

impl GptHeader {
    /// GPT header signature
    pub const SIGNATURE: &'static [u8; 8] = b"EFI PART";

    /// Revision 1.0
    pub const REVISION_1_0: u32 = 0x0001_0000;

    /// Header size written by this tool
    pub const HEADER_SIZE: usize = 92;

    /// Byte range of the header CRC32 field
    const CRC_FIELD: std::ops::Range<usize> = 16..20;

    /// Parse GPT header from bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is short, the signature is wrong or the
    /// recorded header size does not fit in the buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(Error::invalid_table(format!(
                "GPT header needs {} bytes, got {}",
                Self::HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut signature = [0u8; 8];
        signature.copy_from_slice(&bytes[0..8]);
        if &signature != Self::SIGNATURE {
            return Err(Error::invalid_table("Invalid GPT header signature"));
        }

        let header = Self {
            signature,
            revision: u32_at(bytes, 8),
            header_size: u32_at(bytes, 12),
            header_crc32: u32_at(bytes, 16),
            reserved: u32_at(bytes, 20),
            my_lba: u64_at(bytes, 24),
            alternate_lba: u64_at(bytes, 32),
            first_usable_lba: u64_at(bytes, 40),
            last_usable_lba: u64_at(bytes, 48),
            disk_guid: Identifier::from_disk_bytes(guid_at(bytes, 56)),
            partition_entry_lba: u64_at(bytes, 72),
            num_partition_entries: u32_at(bytes, 80),
            partition_entry_size: u32_at(bytes, 84),
            partition_entries_crc32: u32_at(bytes, 88),
        };

        let size = header.header_size as usize;
        if size < Self::HEADER_SIZE || size > bytes.len() {
            return Err(Error::invalid_table(format!(
                "GPT header size {} is outside {}..={}",
                size,
                Self::HEADER_SIZE,
                bytes.len()
            )));
        }

        Ok(header)
    }

    /// Encode the header in its 92 on-disk bytes
    pub fn to_bytes(&self) -> [u8; Self::HEADER_SIZE] {
        let mut out = [0u8; Self::HEADER_SIZE];
        out[0..8].copy_from_slice(&self.signature);
        out[8..12].copy_from_slice(&self.revision.to_le_bytes());
        out[12..16].copy_from_slice(&self.header_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.header_crc32.to_le_bytes());
        out[20..24].copy_from_slice(&self.reserved.to_le_bytes());
        out[24..32].copy_from_slice(&self.my_lba.to_le_bytes());
        out[32..40].copy_from_slice(&self.alternate_lba.to_le_bytes());
        out[40..48].copy_from_slice(&self.first_usable_lba.to_le_bytes());
        out[48..56].copy_from_slice(&self.last_usable_lba.to_le_bytes());
        out[56..72].copy_from_slice(&self.disk_guid.to_disk_bytes());
        out[72..80].copy_from_slice(&self.partition_entry_lba.to_le_bytes());
        out[80..84].copy_from_slice(&self.num_partition_entries.to_le_bytes());
        out[84..88].copy_from_slice(&self.partition_entry_size.to_le_bytes());
        out[88..92].copy_from_slice(&self.partition_entries_crc32.to_le_bytes());
        out
    }

    /// CRC32 of the serialized header with the CRC field zeroed
    pub fn compute_header_crc32(&self) -> u32 {
        let mut bytes = self.to_bytes();
        bytes[Self::CRC_FIELD].fill(0);
        crc32(&bytes)
    }

    /// Recompute and store the header CRC32
    pub fn seal(&mut self) {
        self.header_crc32 = 0;
        self.header_crc32 = self.compute_header_crc32();
    }

    /// Verify the header CRC32 checksum against raw on-disk bytes
    ///
    /// The checksum covers exactly `header_size` bytes with the CRC field
    /// zeroed.
    pub fn verify_header_crc32(&self, header_bytes: &[u8]) -> bool {
        let size = self.header_size as usize;
        if header_bytes.len() < size || size < Self::HEADER_SIZE {
            return false;
        }

        let mut header_for_crc = header_bytes[..size].to_vec();
        header_for_crc[Self::CRC_FIELD].fill(0);

        crc32(&header_for_crc) == self.header_crc32
    }

    /// Verify the partition entries array CRC32 checksum
    pub fn verify_partition_entries_crc32(&self, partition_entries_bytes: &[u8]) -> bool {
        let expected_size = self.entry_array_len();

        if partition_entries_bytes.len() < expected_size {
            return false;
        }

        crc32(&partition_entries_bytes[..expected_size]) == self.partition_entries_crc32
    }

    /// Length in bytes of the entry array this header describes
    pub fn entry_array_len(&self) -> usize {
        self.num_partition_entries as usize * self.partition_entry_size as usize
    }
}

fn u32_at(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn u64_at(bytes: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[off..off + 8]);
    u64::from_le_bytes(raw)
}

fn guid_at(bytes: &[u8], off: usize) -> [u8; 16] {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&bytes[off..off + 16]);
    raw
}
