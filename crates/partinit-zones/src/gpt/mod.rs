//! GPT (GUID Partition Table) construction and read-back

pub mod types;

use crate::mbr::MasterBootRecord;
use partinit_core::checksum::crc32;
use partinit_core::limits::{self, MAX_ALLOCATION_SIZE};
use partinit_core::{Error, Identifier, Result};
use partinit_pipeline::BlockDevice;
use serde::Serialize;
use std::io::{Read, Seek, Write};
use types::{empty_entry_array, GptHeader, GptPartitionEntry};

/// Minimum number of entries a GPT reserves space for
pub const MIN_PARTITION_ENTRIES: u32 = 128;

/// Sector counts derived from the device size, sector size and entry count
///
/// # Structure
///
/// ```text
/// LBA 0:                      Protective MBR
/// LBA 1:                      Primary GPT header
/// LBA 2 .. reserved-1:        Primary partition entry array
/// LBA reserved .. last usable: Usable disk space
/// last usable+1 .. N-2:       Backup partition entry array
/// LBA N-1:                    Backup GPT header
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GptGeometry {
    /// Sector size in bytes
    pub sector_size: u32,
    /// Device size in sectors
    pub device_sectors: u64,
    /// Number of reserved partition entries
    pub entry_count: u32,
    /// Sectors taken by MBR, header and entry array at the head of the disk
    pub reserved_sectors: u64,
}

impl GptGeometry {
    /// Derive the geometry
    ///
    /// # Errors
    ///
    /// Returns a validation error if the entry count is below the minimum, the
    /// entry array is too large to build, or the device cannot hold both
    /// reserved regions.
    pub fn new(device_sectors: u64, sector_size: u32, entry_count: u32) -> Result<Self> {
        limits::validate_sector_size(sector_size)?;

        if entry_count < MIN_PARTITION_ENTRIES {
            return Err(Error::validation(format!(
                "GPT must have at least {} partition entries, got {}",
                MIN_PARTITION_ENTRIES, entry_count
            )));
        }

        let array_len = limits::checked_multiply_u64(
            entry_count as u64,
            GptPartitionEntry::ENTRY_SIZE as u64,
            "Partition entry array",
        )?;
        limits::validate_allocation_size(array_len, MAX_ALLOCATION_SIZE, "Partition entry array")?;

        let sector = sector_size as u64;
        let reserved_bytes = limits::round_up(2 * sector + array_len, sector);
        let reserved_sectors = reserved_bytes / sector;

        if device_sectors < 2 * reserved_sectors {
            return Err(Error::validation(format!(
                "Image of {} sectors is too small for a GPT with {} entries (needs at least {})",
                device_sectors,
                entry_count,
                2 * reserved_sectors
            )));
        }

        Ok(Self {
            sector_size,
            device_sectors,
            entry_count,
            reserved_sectors,
        })
    }

    /// Sectors occupied by one copy of the entry array
    pub fn entry_array_sectors(&self) -> u64 {
        self.reserved_sectors - 2
    }

    /// Entry array length in bytes
    pub fn entry_array_len(&self) -> usize {
        self.entry_count as usize * GptPartitionEntry::ENTRY_SIZE
    }

    /// First sector of the tail reserved region
    pub fn tail_region_lba(&self) -> u64 {
        self.device_sectors - self.reserved_sectors
    }
}

/// A complete, empty GPT ready to be committed
#[derive(Debug, Clone)]
pub struct GptLayout {
    pub geometry: GptGeometry,
    pub protective_mbr: MasterBootRecord,
    pub primary: GptHeader,
    pub backup: GptHeader,
}

impl GptLayout {
    /// Build the protective MBR and both headers
    ///
    /// The entry array is all-zero; its CRC covers every reserved entry.
    pub fn build(
        device_sectors: u64,
        sector_size: u32,
        entry_count: u32,
        disk_guid: Identifier,
    ) -> Result<Self> {
        let geometry = GptGeometry::new(device_sectors, sector_size, entry_count)?;
        tracing::debug!(
            "GPT geometry: {} sectors of {} bytes, {} entries, {} reserved sectors per copy",
            device_sectors,
            sector_size,
            entry_count,
            geometry.reserved_sectors
        );

        let entries_crc = crc32(&empty_entry_array(entry_count));

        let mut primary = GptHeader {
            signature: *GptHeader::SIGNATURE,
            revision: GptHeader::REVISION_1_0,
            header_size: GptHeader::HEADER_SIZE as u32,
            header_crc32: 0,
            reserved: 0,
            my_lba: 1,
            alternate_lba: device_sectors - 1,
            first_usable_lba: geometry.reserved_sectors,
            last_usable_lba: device_sectors - geometry.reserved_sectors,
            disk_guid,
            partition_entry_lba: 2,
            num_partition_entries: entry_count,
            partition_entry_size: GptPartitionEntry::ENTRY_SIZE as u32,
            partition_entries_crc32: entries_crc,
        };
        primary.seal();

        let backup = Self::mirror(&primary, &geometry);

        Ok(Self {
            geometry,
            protective_mbr: MasterBootRecord::protective(device_sectors),
            primary,
            backup,
        })
    }

    /// Backup header for `primary`: LBAs swapped, entry array just below it
    fn mirror(primary: &GptHeader, geometry: &GptGeometry) -> GptHeader {
        let mut backup = primary.clone();
        backup.header_crc32 = 0;
        backup.my_lba = primary.alternate_lba;
        backup.alternate_lba = primary.my_lba;
        backup.partition_entry_lba = backup.my_lba - geometry.entry_array_sectors();
        backup.seal();
        backup
    }

    /// Serialized (all-zero) entry array
    pub fn entry_array(&self) -> Vec<u8> {
        empty_entry_array(self.geometry.entry_count)
    }
}

/// A GPT read back from a device, with its verification results
#[derive(Debug, Clone)]
pub struct GptTable {
    pub primary: GptHeader,
    pub backup: Option<GptHeader>,
    /// Primary entry array CRC matched
    pub primary_entries_valid: bool,
    /// Backup header and entry array CRCs matched
    pub backup_valid: bool,
    /// Backup mirrors the primary (LBAs swapped, same table parameters)
    pub mirrored: bool,
    /// Headers sit at LBA 1 and the last sector, backup array below its header
    pub placement_valid: bool,
    /// Entries in use
    pub used_entries: usize,
}

impl GptTable {
    /// Read and verify the primary and backup tables
    ///
    /// # Errors
    ///
    /// Fails if the primary header is missing, malformed or fails its CRC.
    /// Problems with the backup are recorded in the result instead.
    pub fn read<S: Read + Write + Seek>(disk: &mut BlockDevice<S>) -> Result<Self> {
        let sector_size = disk.sector_size() as usize;

        let mut header_sector = vec![0u8; sector_size];
        disk.read_lba(1, &mut header_sector)?;
        let primary = GptHeader::from_bytes(&header_sector)?;

        if !primary.verify_header_crc32(&header_sector) {
            return Err(Error::ChecksumVerification(
                "GPT header CRC32 verification failed".to_string(),
            ));
        }

        let entries = Self::read_entries(disk, &primary)?;
        let primary_entries_valid = primary.verify_partition_entries_crc32(&entries);
        let mut used_entries = 0;
        for chunk in entries.chunks_exact(GptPartitionEntry::ENTRY_SIZE) {
            if !GptPartitionEntry::from_bytes(chunk)?.is_unused() {
                used_entries += 1;
            }
        }

        let (backup, backup_valid) = match Self::read_backup(disk, &primary) {
            Ok((header, valid)) => (Some(header), valid),
            Err(e) => {
                tracing::warn!("Backup GPT header unreadable: {}", e);
                (None, false)
            }
        };

        let mirrored = backup
            .as_ref()
            .map(|b| is_mirror(&primary, b))
            .unwrap_or(false);

        let placement_valid = is_placed(
            &primary,
            backup.as_ref(),
            disk.size_lba(),
            disk.sector_size(),
        );

        Ok(Self {
            primary,
            backup,
            primary_entries_valid,
            backup_valid,
            mirrored,
            placement_valid,
            used_entries,
        })
    }

    /// True when both copies verify, mirror each other and sit where they belong
    pub fn is_consistent(&self) -> bool {
        self.primary_entries_valid && self.backup_valid && self.mirrored && self.placement_valid
    }

    fn read_backup<S: Read + Write + Seek>(
        disk: &mut BlockDevice<S>,
        primary: &GptHeader,
    ) -> Result<(GptHeader, bool)> {
        let mut sector = vec![0u8; disk.sector_size() as usize];
        disk.read_lba(primary.alternate_lba, &mut sector)?;
        let backup = GptHeader::from_bytes(&sector)?;

        let header_ok = backup.verify_header_crc32(&sector);
        let entries = Self::read_entries(disk, &backup)?;
        let entries_ok = backup.verify_partition_entries_crc32(&entries);
        Ok((backup, header_ok && entries_ok))
    }

    fn read_entries<S: Read + Write + Seek>(
        disk: &mut BlockDevice<S>,
        header: &GptHeader,
    ) -> Result<Vec<u8>> {
        if header.partition_entry_size as usize != GptPartitionEntry::ENTRY_SIZE {
            return Err(Error::invalid_table(format!(
                "Unsupported partition entry size {}",
                header.partition_entry_size
            )));
        }

        let len = limits::validate_allocation_size(
            header.entry_array_len() as u64,
            MAX_ALLOCATION_SIZE,
            "Partition entry array",
        )?;
        let span = limits::round_up(len as u64, disk.sector_size() as u64);
        let mut buf = vec![0u8; limits::u64_to_usize(span, "Partition entry array")?];
        disk.read_lba(header.partition_entry_lba, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }
}

fn is_mirror(primary: &GptHeader, backup: &GptHeader) -> bool {
    backup.my_lba == primary.alternate_lba
        && backup.alternate_lba == primary.my_lba
        && backup.first_usable_lba == primary.first_usable_lba
        && backup.last_usable_lba == primary.last_usable_lba
        && backup.disk_guid == primary.disk_guid
        && backup.num_partition_entries == primary.num_partition_entries
        && backup.partition_entry_size == primary.partition_entry_size
        && backup.partition_entries_crc32 == primary.partition_entries_crc32
}

/// Primary at LBA 1 with its array at LBA 2, backup header on the last
/// sector, backup array between the usable range and the backup header
fn is_placed(
    primary: &GptHeader,
    backup: Option<&GptHeader>,
    device_sectors: u64,
    sector_size: u32,
) -> bool {
    if primary.my_lba != 1
        || primary.partition_entry_lba != 2
        || primary.alternate_lba != device_sectors.saturating_sub(1)
    {
        return false;
    }

    let Some(backup) = backup else {
        return false;
    };

    let array_sectors = (primary.entry_array_len() as u64).div_ceil(sector_size as u64);
    backup.partition_entry_lba == primary.last_usable_lba.saturating_add(1)
        && backup.partition_entry_lba > backup.last_usable_lba
        && backup.partition_entry_lba.saturating_add(array_sectors) <= backup.my_lba
}
