//! Read-back verification of an initialized image

use partinit_core::{Error, Identifier, Result};
use partinit_pipeline::{BlockDevice, OpenMode};
use partinit_zones::mbr::types::PartitionRecord;
use partinit_zones::{GptTable, MasterBootRecord};
use serde::Serialize;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;

use crate::config::DEFAULT_SECTOR_SIZE;

/// Options for inspecting an image
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    pub image: Option<PathBuf>,
    pub sector_size: Option<u32>,
}

/// One non-empty MBR partition record
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub index: usize,
    pub os_type: u8,
    pub starting_lba: u32,
    pub size_in_lba: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MbrSummary {
    pub disk_signature: u32,
    pub protective: bool,
    pub records: Vec<RecordSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GptSummary {
    pub disk_guid: Identifier,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub entry_count: u32,
    pub entries_crc32: u32,
    pub primary_lba: u64,
    pub backup_lba: u64,
    pub backup_entry_lba: Option<u64>,
    pub used_entries: usize,
    pub primary_entries_valid: bool,
    pub backup_valid: bool,
    pub mirrored: bool,
    pub placement_valid: bool,
}

/// What was found on the image
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub image: PathBuf,
    pub sector_size: u32,
    pub device_sectors: u64,
    pub mbr: MbrSummary,
    pub gpt: Option<GptSummary>,
}

/// Open `options.image` read-only and verify its table
///
/// # Errors
///
/// Fails when the MBR is missing, the primary GPT header is unreadable, or
/// the two GPT copies do not verify and mirror each other.
pub fn inspect(options: InspectOptions) -> Result<InspectReport> {
    let image = options
        .image
        .ok_or_else(|| Error::configuration("A disk image to inspect is required"))?;
    partinit_core::limits::validate_regular_file(&image, "Disk image")?;
    let sector_size = options.sector_size.unwrap_or(DEFAULT_SECTOR_SIZE);
    partinit_core::limits::validate_sector_size(sector_size)?;

    let mut disk = BlockDevice::open(&image, sector_size, OpenMode::Read)?;
    inspect_device(&mut disk, image)
}

/// Inspect an already opened device
pub fn inspect_device<S: Read + Write + Seek>(
    disk: &mut BlockDevice<S>,
    image: PathBuf,
) -> Result<InspectReport> {
    let device_sectors = disk.size_lba();
    if device_sectors == 0 {
        return Err(Error::invalid_table("Image holds no complete sector"));
    }

    let mut sector = vec![0u8; disk.sector_size() as usize];
    disk.read_lba(0, &mut sector)?;
    let mbr = MasterBootRecord::from_bytes(&sector)?;

    let records = mbr
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_empty())
        .map(|(index, r)| RecordSummary {
            index,
            os_type: r.os_type.0,
            starting_lba: r.starting_lba,
            size_in_lba: r.size_in_lba,
        })
        .collect();

    tracing::info!(
        "MBR: disk signature 0x{:08X}, record 0 {}",
        mbr.disk_signature,
        mbr.records[0].os_type
    );

    let protective = mbr.is_gpt_protective();
    let gpt = if protective {
        let expected = PartitionRecord::protective(device_sectors).size_in_lba;
        if mbr.records[0].size_in_lba != expected {
            tracing::warn!(
                "Protective record covers {} sectors, expected {}",
                mbr.records[0].size_in_lba,
                expected
            );
        }
        Some(verify_gpt(disk)?)
    } else {
        None
    };

    Ok(InspectReport {
        image,
        sector_size: disk.sector_size(),
        device_sectors,
        mbr: MbrSummary {
            disk_signature: mbr.disk_signature,
            protective,
            records,
        },
        gpt,
    })
}

fn verify_gpt<S: Read + Write + Seek>(disk: &mut BlockDevice<S>) -> Result<GptSummary> {
    let table = GptTable::read(disk)?;
    let primary = &table.primary;

    tracing::info!(
        "GPT: disk GUID {}, usable LBA {}..={}, {} entries ({} used)",
        primary.disk_guid,
        primary.first_usable_lba,
        primary.last_usable_lba,
        primary.num_partition_entries,
        table.used_entries
    );

    if !table.primary_entries_valid {
        tracing::warn!("Primary partition entry array CRC32 mismatch");
    }
    if !table.backup_valid {
        tracing::warn!("Backup GPT header or entry array failed verification");
    }
    if !table.mirrored {
        tracing::warn!("Backup GPT header does not mirror the primary");
    }
    if !table.placement_valid {
        tracing::warn!("GPT headers or entry arrays are not at their expected LBAs");
    }

    if !table.is_consistent() {
        return Err(Error::ChecksumVerification(format!(
            "GPT copies disagree (primary entries valid: {}, backup valid: {}, mirrored: {}, placed: {})",
            table.primary_entries_valid, table.backup_valid, table.mirrored, table.placement_valid
        )));
    }

    Ok(GptSummary {
        disk_guid: primary.disk_guid,
        first_usable_lba: primary.first_usable_lba,
        last_usable_lba: primary.last_usable_lba,
        entry_count: primary.num_partition_entries,
        entries_crc32: primary.partition_entries_crc32,
        primary_lba: primary.my_lba,
        backup_lba: primary.alternate_lba,
        backup_entry_lba: table.backup.as_ref().map(|b| b.partition_entry_lba),
        used_entries: table.used_entries,
        primary_entries_valid: table.primary_entries_valid,
        backup_valid: table.backup_valid,
        mirrored: table.mirrored,
        placement_valid: table.placement_valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, InitOptions};
    use crate::init::init_table;
    use partinit_core::SeededRandom;
    use std::path::Path;
    use tempfile::NamedTempFile;

    fn initialized(len: u64, options: InitOptions) -> NamedTempFile {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(len).unwrap();
        let options = InitOptions {
            image: Some(tmp.path().to_path_buf()),
            ..options
        };
        let config = resolve(options, &mut SeededRandom::new(21)).unwrap();
        init_table(config).unwrap();
        tmp
    }

    fn inspect_path(path: &Path) -> Result<InspectReport> {
        inspect(InspectOptions {
            image: Some(path.to_path_buf()),
            sector_size: None,
        })
    }

    fn corrupt(path: &Path, offset: u64) {
        let mut bytes = std::fs::read(path).unwrap();
        bytes[offset as usize] ^= 0xFF;
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_inspect_fresh_gpt() {
        let tmp = initialized(10 * 1024 * 1024, InitOptions::default());
        let report = inspect_path(tmp.path()).unwrap();

        assert!(report.mbr.protective);
        assert_eq!(report.mbr.records.len(), 1);
        assert_eq!(report.mbr.records[0].size_in_lba, 20479);

        let gpt = report.gpt.unwrap();
        assert_eq!(gpt.backup_lba, 20479);
        assert_eq!(gpt.backup_entry_lba, Some(20447));
        assert_eq!(gpt.entries_crc32, 0xAB54_D286);
        assert_eq!(gpt.used_entries, 0);
        assert!(gpt.mirrored && gpt.backup_valid && gpt.primary_entries_valid);
        assert!(gpt.placement_valid);
    }

    #[test]
    fn test_inspect_legacy_mbr() {
        let tmp = initialized(
            64 * 1024,
            InitOptions {
                table_type: Some("mbr".to_string()),
                disk_signature: Some(0xA1B2C3D4),
                ..Default::default()
            },
        );
        let report = inspect_path(tmp.path()).unwrap();
        assert!(!report.mbr.protective);
        assert!(report.mbr.records.is_empty());
        assert_eq!(report.mbr.disk_signature, 0xA1B2C3D4);
        assert!(report.gpt.is_none());
    }

    #[test]
    fn test_inspect_blank_image() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(4096).unwrap();
        assert!(matches!(
            inspect_path(tmp.path()),
            Err(Error::InvalidTable(_))
        ));
    }

    #[test]
    fn test_inspect_detects_corrupt_backup() {
        let tmp = initialized(10 * 1024 * 1024, InitOptions::default());
        // Inside the backup header's usable-LBA field
        corrupt(tmp.path(), 20479 * 512 + 44);
        assert!(matches!(
            inspect_path(tmp.path()),
            Err(Error::ChecksumVerification(_))
        ));
    }

    #[test]
    fn test_inspect_detects_corrupt_entry_array() {
        let tmp = initialized(10 * 1024 * 1024, InitOptions::default());
        corrupt(tmp.path(), 2 * 512 + 5000);
        assert!(matches!(
            inspect_path(tmp.path()),
            Err(Error::ChecksumVerification(_))
        ));
    }

    #[test]
    fn test_inspect_detects_corrupt_primary() {
        let tmp = initialized(10 * 1024 * 1024, InitOptions::default());
        corrupt(tmp.path(), 512 + 60);
        assert!(matches!(
            inspect_path(tmp.path()),
            Err(Error::ChecksumVerification(_))
        ));
    }
}
