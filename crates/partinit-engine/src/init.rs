//! Table construction and commit
//!
//! Commit order for GPT: zero the table regions (or the whole image), then the
//! protective MBR at LBA 0, the backup header at the end of the disk, and the
//! primary header at LBA 1 last, followed by a flush. An interrupted commit
//! therefore never leaves a primary header pointing at a missing backup.
//! The writes are still not atomic.

use crate::config::{ResolvedConfig, TableSettings};
use crate::render::RenderedStructure;
use partinit_core::{Error, Result};
use partinit_pipeline::{BlockDevice, OpenMode};
use partinit_zones::{GptGeometry, GptLayout, MasterBootRecord};
use serde::Serialize;
use std::io::{Read, Seek, Write};

/// Result of an initialization
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub config: ResolvedConfig,
    /// Usable device size in sectors
    pub device_sectors: u64,
    /// GPT geometry, absent for MBR
    pub geometry: Option<GptGeometry>,
    /// Structures in commit order
    pub structures: Vec<RenderedStructure>,
    /// False for a dry run
    pub written: bool,
}

/// What will be written
enum Plan {
    Gpt(GptLayout),
    Mbr(MasterBootRecord),
}

impl Plan {
    /// Encoded structures with their target LBAs, in commit order
    fn structures(&self) -> Vec<(&'static str, u64, Vec<u8>)> {
        match self {
            Plan::Gpt(layout) => vec![
                ("Protective MBR", 0, layout.protective_mbr.to_bytes().to_vec()),
                (
                    "Backup GPT header",
                    layout.backup.my_lba,
                    layout.backup.to_bytes().to_vec(),
                ),
                (
                    "Primary GPT header",
                    layout.primary.my_lba,
                    layout.primary.to_bytes().to_vec(),
                ),
            ],
            Plan::Mbr(mbr) => vec![("MBR", 0, mbr.to_bytes().to_vec())],
        }
    }
}

/// Initialize the table described by `config` on its image
pub fn init_table(config: ResolvedConfig) -> Result<InitReport> {
    let mode = if config.dry_run {
        OpenMode::Read
    } else {
        OpenMode::Write
    };
    let mut disk = BlockDevice::open(&config.image, config.sector_size, mode)?;
    init_on_device(&mut disk, config)
}

/// Initialize a table on an already opened device
pub fn init_on_device<S: Read + Write + Seek>(
    disk: &mut BlockDevice<S>,
    config: ResolvedConfig,
) -> Result<InitReport> {
    let device_sectors = disk.size_lba();
    let plan = build_plan(&config, device_sectors)?;
    log_summary(&config, device_sectors);

    let structures = plan.structures();
    let rendered = structures
        .iter()
        .map(|(name, lba, bytes)| RenderedStructure::new(*name, *lba, bytes))
        .collect();

    let geometry = match &plan {
        Plan::Gpt(layout) => Some(layout.geometry),
        Plan::Mbr(_) => None,
    };

    if config.dry_run {
        tracing::info!("Dry run: {} left untouched", config.image.display());
        return Ok(InitReport {
            config,
            device_sectors,
            geometry,
            structures: rendered,
            written: false,
        });
    }

    if !disk.mode().can_write() {
        return Err(Error::invalid_operation(format!(
            "Device for '{}' was opened {:?} and cannot be written",
            config.image.display(),
            disk.mode()
        )));
    }

    clear(disk, &config, geometry.as_ref(), device_sectors)?;
    for (name, lba, bytes) in &structures {
        disk.seek(*lba)?;
        disk.write(bytes)?;
        tracing::info!("Wrote {} at LBA {}", name, lba);
    }
    disk.flush()?;

    Ok(InitReport {
        config,
        device_sectors,
        geometry,
        structures: rendered,
        written: true,
    })
}

fn build_plan(config: &ResolvedConfig, device_sectors: u64) -> Result<Plan> {
    match &config.table {
        TableSettings::Gpt {
            entry_count,
            disk_guid,
        } => Ok(Plan::Gpt(GptLayout::build(
            device_sectors,
            config.sector_size,
            *entry_count,
            *disk_guid,
        )?)),
        TableSettings::Mbr {
            boot_code,
            disk_signature,
        } => {
            if device_sectors == 0 {
                return Err(Error::validation(format!(
                    "Image '{}' holds no complete {} byte sector",
                    config.image.display(),
                    config.sector_size
                )));
            }
            let code = boot_code.as_ref().map(|b| b.bytes.as_slice());
            Ok(Plan::Mbr(MasterBootRecord::legacy(code, *disk_signature)?))
        }
    }
}

fn clear<S: Read + Write + Seek>(
    disk: &mut BlockDevice<S>,
    config: &ResolvedConfig,
    geometry: Option<&GptGeometry>,
    device_sectors: u64,
) -> Result<()> {
    if config.clear_all {
        tracing::info!("Zeroing all {} sectors", device_sectors);
        return disk.zero_lba(0, device_sectors);
    }

    if let Some(g) = geometry {
        disk.zero_lba(0, g.reserved_sectors)?;
        disk.zero_lba(g.tail_region_lba(), g.reserved_sectors)?;
    }
    Ok(())
}

fn log_summary(config: &ResolvedConfig, device_sectors: u64) {
    tracing::info!(
        "{} {} partition table",
        if config.dry_run { "Planning" } else { "Writing" },
        config.table_kind()
    );
    tracing::info!("  Disk image:   {}", config.image.display());
    tracing::info!("  Sector size:  {}", config.sector_size);
    tracing::info!("  Sectors:      {}", device_sectors);
    tracing::info!("  Clear image:  {}", config.clear_all);

    match &config.table {
        TableSettings::Gpt {
            entry_count,
            disk_guid,
        } => {
            tracing::info!("  Entry count:  {}", entry_count);
            tracing::info!("  Disk GUID:    {}", disk_guid);
        }
        TableSettings::Mbr {
            boot_code,
            disk_signature,
        } => {
            match boot_code {
                Some(code) => tracing::info!("  Boot code:    {}", code.path.display()),
                None => tracing::info!("  Boot code:    default"),
            }
            tracing::info!("  Disk sig:     0x{:08X}", disk_signature);
        }
    }
}
