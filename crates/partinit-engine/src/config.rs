//! Option resolution
//!
//! Raw user input arrives as [`InitOptions`], where every field may be absent.
//! [`resolve`] applies defaults, clamps and cross-checks it and produces an
//! immutable [`ResolvedConfig`]. Nothing touches the image before resolution
//! has succeeded.

use partinit_core::limits::{self, MAX_ALLOCATION_SIZE};
use partinit_core::{Error, Identifier, RandomSource, Result};
use partinit_zones::gpt::types::GptPartitionEntry;
use partinit_zones::gpt::MIN_PARTITION_ENTRIES;
use partinit_zones::MasterBootRecord;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default sector size in bytes
pub const DEFAULT_SECTOR_SIZE: u32 = 512;

/// Kind of partition table to initialize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TableKind {
    #[default]
    Gpt,
    Mbr,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Gpt => write!(f, "GPT"),
            TableKind::Mbr => write!(f, "MBR"),
        }
    }
}

impl FromStr for TableKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("gpt") {
            Ok(TableKind::Gpt)
        } else if s.eq_ignore_ascii_case("mbr") {
            Ok(TableKind::Mbr)
        } else {
            Err(Error::configuration(format!(
                "Unknown table type '{}' (expected GPT or MBR)",
                s
            )))
        }
    }
}

/// Raw options for initializing a table
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Target disk image (required)
    pub image: Option<PathBuf>,
    /// Sector size in bytes (default 512)
    pub sector_size: Option<u32>,
    /// "GPT" or "MBR", case-insensitive (default GPT)
    pub table_type: Option<String>,
    /// GPT entry count (default 128)
    pub entry_count: Option<u64>,
    /// GPT disk identifier: canonical string or "random"
    pub disk_guid: Option<String>,
    /// MBR boot code file
    pub boot_code: Option<PathBuf>,
    /// MBR disk signature
    pub disk_signature: Option<u32>,
    /// Compute and render without writing
    pub dry_run: bool,
    /// Zero the whole image instead of only the table regions
    pub clear_all: bool,
    /// Turn ignorable option problems into failures
    pub strict: bool,
}

/// Boot code loaded from a file
#[derive(Debug, Clone, Serialize)]
pub struct BootCode {
    pub path: PathBuf,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Settings specific to the table kind
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum TableSettings {
    Gpt {
        entry_count: u32,
        disk_guid: Identifier,
    },
    Mbr {
        /// `None` selects the built-in stub
        boot_code: Option<BootCode>,
        disk_signature: u32,
    },
}

impl TableSettings {
    pub fn kind(&self) -> TableKind {
        match self {
            TableSettings::Gpt { .. } => TableKind::Gpt,
            TableSettings::Mbr { .. } => TableKind::Mbr,
        }
    }
}

/// Fully defaulted and validated configuration
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub image: PathBuf,
    pub sector_size: u32,
    pub table: TableSettings,
    pub dry_run: bool,
    pub clear_all: bool,
    pub strict: bool,
    /// Problems that were downgraded to warnings
    pub warnings: Vec<String>,
}

impl ResolvedConfig {
    pub fn table_kind(&self) -> TableKind {
        self.table.kind()
    }
}

/// Collects warnings, or fails on the first one in strict mode
struct Policy {
    strict: bool,
    warnings: Vec<String>,
}

impl Policy {
    fn ignore(&mut self, option: &str, kind: TableKind) -> Result<()> {
        let msg = format!("--{} has no effect on a {} table", option, kind);
        if self.strict {
            return Err(Error::configuration(msg));
        }
        tracing::warn!("{}; ignoring it", msg);
        self.warnings.push(msg);
        Ok(())
    }
}

/// Resolve raw options into a configuration
///
/// `rng` supplies the disk identifier or disk signature when none is given.
///
/// # Errors
///
/// - `Configuration` for a missing or unusable image, an unknown table type,
///   or (in strict mode) options that do not apply to the table type
/// - `Validation` for sizes out of range, including an entry count below 128
///   in strict mode
/// - `Parse` for a malformed disk identifier
/// - `Io` when the boot code file cannot be read
pub fn resolve(options: InitOptions, rng: &mut dyn RandomSource) -> Result<ResolvedConfig> {
    let mut policy = Policy {
        strict: options.strict,
        warnings: Vec::new(),
    };

    let image = options
        .image
        .ok_or_else(|| Error::configuration("A target disk image is required"))?;
    limits::validate_regular_file(&image, "Disk image")?;

    let sector_size = options.sector_size.unwrap_or(DEFAULT_SECTOR_SIZE);
    limits::validate_sector_size(sector_size)?;

    let kind = match options.table_type.as_deref() {
        Some(s) => s.parse()?,
        None => TableKind::default(),
    };

    let table = match kind {
        TableKind::Gpt => {
            if options.boot_code.is_some() {
                policy.ignore("boot-code", kind)?;
            }
            if options.disk_signature.is_some() {
                policy.ignore("disk-signature", kind)?;
            }

            TableSettings::Gpt {
                entry_count: resolve_entry_count(options.entry_count, &mut policy)?,
                disk_guid: resolve_disk_guid(options.disk_guid.as_deref(), rng)?,
            }
        }
        TableKind::Mbr => {
            if options.entry_count.is_some() {
                policy.ignore("entry-count", kind)?;
            }
            if options.disk_guid.is_some() {
                policy.ignore("disk-guid", kind)?;
            }

            let boot_code = options
                .boot_code
                .map(|path| load_boot_code(&path))
                .transpose()?;

            TableSettings::Mbr {
                boot_code,
                disk_signature: options.disk_signature.unwrap_or_else(|| rng.next_u32()),
            }
        }
    };

    Ok(ResolvedConfig {
        image,
        sector_size,
        table,
        dry_run: options.dry_run,
        clear_all: options.clear_all,
        strict: options.strict,
        warnings: policy.warnings,
    })
}

fn resolve_entry_count(requested: Option<u64>, policy: &mut Policy) -> Result<u32> {
    let requested = requested.unwrap_or(MIN_PARTITION_ENTRIES as u64);

    let count = u32::try_from(requested).map_err(|_| {
        Error::validation(format!("Entry count {} does not fit in 32 bits", requested))
    })?;

    let count = if count < MIN_PARTITION_ENTRIES {
        let msg = format!(
            "Entry count {} is below the minimum of {}",
            count, MIN_PARTITION_ENTRIES
        );
        if policy.strict {
            return Err(Error::validation(msg));
        }
        tracing::warn!("{}; using {}", msg, MIN_PARTITION_ENTRIES);
        policy.warnings.push(msg);
        MIN_PARTITION_ENTRIES
    } else {
        count
    };

    let array_len = count as u64 * GptPartitionEntry::ENTRY_SIZE as u64;
    limits::validate_allocation_size(array_len, MAX_ALLOCATION_SIZE, "Partition entry array")?;

    Ok(count)
}

fn resolve_disk_guid(requested: Option<&str>, rng: &mut dyn RandomSource) -> Result<Identifier> {
    let parsed = match requested {
        None => None,
        Some(s) if s.eq_ignore_ascii_case("random") => None,
        Some(s) => Some(Identifier::parse(s)?),
    };

    match parsed {
        Some(guid) if !guid.is_nil() => Ok(guid),
        _ => Ok(Identifier::generate_v4(rng)),
    }
}

/// Read the boot code file; open and read failures surface as I/O errors
fn load_boot_code(path: &Path) -> Result<BootCode> {
    if path.as_os_str().is_empty() {
        return Err(Error::configuration("Boot code file path is empty"));
    }
    if std::fs::metadata(path)?.is_dir() {
        return Err(Error::configuration(format!(
            "Boot code file '{}' is a directory",
            path.display()
        )));
    }
    let bytes = std::fs::read(path)?;

    if bytes.len() > MasterBootRecord::BOOT_CODE_SIZE {
        return Err(Error::validation(format!(
            "Boot code file '{}' is {} bytes; the MBR boot code area holds {}",
            path.display(),
            bytes.len(),
            MasterBootRecord::BOOT_CODE_SIZE
        )));
    }

    Ok(BootCode {
        path: path.to_path_buf(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use partinit_core::SeededRandom;
    use tempfile::NamedTempFile;

    fn image() -> NamedTempFile {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(1024 * 1024).unwrap();
        tmp
    }

    fn options(tmp: &NamedTempFile) -> InitOptions {
        InitOptions {
            image: Some(tmp.path().to_path_buf()),
            ..Default::default()
        }
    }

    fn rng() -> SeededRandom {
        SeededRandom::new(42)
    }

    #[test]
    fn test_defaults() {
        let tmp = image();
        let config = resolve(options(&tmp), &mut rng()).unwrap();

        assert_eq!(config.sector_size, 512);
        assert_eq!(config.table_kind(), TableKind::Gpt);
        assert!(config.warnings.is_empty());
        match config.table {
            TableSettings::Gpt {
                entry_count,
                disk_guid,
            } => {
                assert_eq!(entry_count, 128);
                assert_eq!(disk_guid.version(), 4);
            }
            other => panic!("unexpected settings {:?}", other),
        }
    }

    #[test]
    fn test_table_kind_case_insensitive() {
        assert_eq!("gpt".parse::<TableKind>().unwrap(), TableKind::Gpt);
        assert_eq!("Mbr".parse::<TableKind>().unwrap(), TableKind::Mbr);
        assert!(matches!(
            "apm".parse::<TableKind>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_image() {
        let result = resolve(InitOptions::default(), &mut rng());
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_image_must_be_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let opts = InitOptions {
            image: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            resolve(opts, &mut rng()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_bad_sector_size() {
        let tmp = image();
        for size in [256, 1000, 1 << 30] {
            let opts = InitOptions {
                sector_size: Some(size),
                ..options(&tmp)
            };
            assert!(matches!(
                resolve(opts, &mut rng()),
                Err(Error::Validation(_))
            ));
        }
    }

    #[test]
    fn test_entry_count_clamped_with_warning() {
        let tmp = image();
        let opts = InitOptions {
            entry_count: Some(4),
            ..options(&tmp)
        };
        let config = resolve(opts, &mut rng()).unwrap();

        assert!(matches!(
            config.table,
            TableSettings::Gpt {
                entry_count: 128,
                ..
            }
        ));
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("below the minimum"));
    }

    #[test]
    fn test_entry_count_rejected_in_strict_mode() {
        let tmp = image();
        let opts = InitOptions {
            entry_count: Some(4),
            strict: true,
            ..options(&tmp)
        };
        assert!(matches!(
            resolve(opts, &mut rng()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_entry_count_limits() {
        let tmp = image();
        let opts = InitOptions {
            entry_count: Some(u32::MAX as u64 + 1),
            ..options(&tmp)
        };
        assert!(matches!(
            resolve(opts, &mut rng()),
            Err(Error::Validation(_))
        ));

        let opts = InitOptions {
            entry_count: Some(u32::MAX as u64),
            ..options(&tmp)
        };
        assert!(matches!(
            resolve(opts, &mut rng()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_disk_guid_forms() {
        let tmp = image();
        let canonical = "C28C3AE5-41BA-4691-B566-F9CE96B5191E";

        let opts = InitOptions {
            disk_guid: Some(canonical.to_string()),
            ..options(&tmp)
        };
        let config = resolve(opts, &mut rng()).unwrap();
        match config.table {
            TableSettings::Gpt { disk_guid, .. } => {
                assert_eq!(disk_guid.format(), canonical.to_lowercase());
            }
            other => panic!("unexpected settings {:?}", other),
        }

        for random in ["random", "RANDOM", "00000000-0000-0000-0000-000000000000"] {
            let opts = InitOptions {
                disk_guid: Some(random.to_string()),
                ..options(&tmp)
            };
            let config = resolve(opts, &mut rng()).unwrap();
            match config.table {
                TableSettings::Gpt { disk_guid, .. } => {
                    assert!(!disk_guid.is_nil());
                    assert_eq!(disk_guid.version(), 4);
                }
                other => panic!("unexpected settings {:?}", other),
            }
        }

        let opts = InitOptions {
            disk_guid: Some("{c28c3ae5-41ba-4691-b566-f9ce96b5191e}".to_string()),
            ..options(&tmp)
        };
        assert!(matches!(resolve(opts, &mut rng()), Err(Error::Parse(_))));
    }

    #[test]
    fn test_seeded_guid_is_reproducible() {
        let tmp = image();
        let a = resolve(options(&tmp), &mut SeededRandom::new(9)).unwrap();
        let b = resolve(options(&tmp), &mut SeededRandom::new(9)).unwrap();
        match (a.table, b.table) {
            (TableSettings::Gpt { disk_guid: x, .. }, TableSettings::Gpt { disk_guid: y, .. }) => {
                assert_eq!(x, y)
            }
            _ => panic!("expected GPT settings"),
        }
    }

    #[test]
    fn test_mbr_options_ignored_for_gpt() {
        let tmp = image();
        let opts = InitOptions {
            disk_signature: Some(0x1234),
            ..options(&tmp)
        };
        let config = resolve(opts.clone(), &mut rng()).unwrap();
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("--disk-signature"));

        let strict = InitOptions {
            strict: true,
            ..opts
        };
        assert!(matches!(
            resolve(strict, &mut rng()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_gpt_options_ignored_for_mbr() {
        let tmp = image();
        let opts = InitOptions {
            table_type: Some("mbr".to_string()),
            entry_count: Some(256),
            disk_guid: Some("random".to_string()),
            disk_signature: Some(0xCAFEBABE),
            ..options(&tmp)
        };
        let config = resolve(opts.clone(), &mut rng()).unwrap();
        assert_eq!(config.warnings.len(), 2);
        assert!(matches!(
            config.table,
            TableSettings::Mbr {
                boot_code: None,
                disk_signature: 0xCAFEBABE
            }
        ));

        let strict = InitOptions {
            strict: true,
            ..opts
        };
        assert!(matches!(
            resolve(strict, &mut rng()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_mbr_random_signature() {
        let tmp = image();
        let opts = InitOptions {
            table_type: Some("MBR".to_string()),
            ..options(&tmp)
        };
        let a = resolve(opts.clone(), &mut SeededRandom::new(5)).unwrap();
        let b = resolve(opts, &mut SeededRandom::new(5)).unwrap();
        match (a.table, b.table) {
            (
                TableSettings::Mbr {
                    disk_signature: x, ..
                },
                TableSettings::Mbr {
                    disk_signature: y, ..
                },
            ) => assert_eq!(x, y),
            _ => panic!("expected MBR settings"),
        }
    }

    #[test]
    fn test_boot_code_loaded() {
        let tmp = image();
        let code = NamedTempFile::new().unwrap();
        std::fs::write(code.path(), [0x90u8; 424]).unwrap();

        let opts = InitOptions {
            table_type: Some("mbr".to_string()),
            boot_code: Some(code.path().to_path_buf()),
            ..options(&tmp)
        };
        let config = resolve(opts, &mut rng()).unwrap();
        match config.table {
            TableSettings::Mbr {
                boot_code: Some(boot),
                ..
            } => assert_eq!(boot.bytes.len(), 424),
            other => panic!("unexpected settings {:?}", other),
        }
    }

    #[test]
    fn test_boot_code_too_large() {
        let tmp = image();
        let code = NamedTempFile::new().unwrap();
        std::fs::write(code.path(), [0x90u8; 425]).unwrap();

        let opts = InitOptions {
            table_type: Some("mbr".to_string()),
            boot_code: Some(code.path().to_path_buf()),
            ..options(&tmp)
        };
        assert!(matches!(
            resolve(opts, &mut rng()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_boot_code_missing() {
        let tmp = image();
        let opts = InitOptions {
            table_type: Some("mbr".to_string()),
            boot_code: Some(PathBuf::from("/nonexistent/boot.bin")),
            ..options(&tmp)
        };
        assert!(matches!(resolve(opts, &mut rng()), Err(Error::Io(_))));
    }

    #[test]
    fn test_boot_code_directory() {
        let tmp = image();
        let opts = InitOptions {
            table_type: Some("mbr".to_string()),
            boot_code: Some(std::env::temp_dir()),
            ..options(&tmp)
        };
        assert!(matches!(
            resolve(opts, &mut rng()),
            Err(Error::Configuration(_))
        ));
    }
}
