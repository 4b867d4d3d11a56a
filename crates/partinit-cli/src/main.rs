//! partinit - initialize partition tables on disk images
//!
//! Writes an empty GPT (with protective MBR) or a legacy MBR to an existing
//! image file, and verifies tables written earlier.

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use partinit_core::OsRandom;
use partinit_engine::{
    run, InitOptions, InitReport, InspectOptions, InspectReport, Outcome, Report, Request,
};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "partinit")]
#[command(about = "Initialize MBR or GPT partition tables on disk images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Write an empty partition table to an existing image
    InitTable(InitArgs),

    /// Verify the partition table on an image
    Inspect {
        /// Disk image to inspect
        image: PathBuf,

        /// Sector size in bytes
        #[arg(long)]
        sector_size: Option<u32>,
    },
}

#[derive(Args)]
struct InitArgs {
    /// Disk image to initialize (must already exist)
    image: PathBuf,

    /// Sector size in bytes [default: 512]
    #[arg(long)]
    sector_size: Option<u32>,

    /// Table type, GPT or MBR [default: GPT]
    #[arg(long = "type", value_name = "TYPE")]
    table_type: Option<String>,

    /// GPT: number of partition entries to reserve [default: 128]
    #[arg(long)]
    entry_count: Option<u64>,

    /// GPT: disk GUID, or "random" [default: random]
    #[arg(long)]
    disk_guid: Option<String>,

    /// MBR: boot code file, at most 424 bytes
    #[arg(long)]
    boot_code: Option<PathBuf>,

    /// MBR: disk signature, decimal or 0x-prefixed hex [default: random]
    #[arg(long, value_parser = parse_u32)]
    disk_signature: Option<u32>,

    /// Show what would be written without modifying the image
    #[arg(long)]
    dry_run: bool,

    /// Zero the whole image instead of only the table regions
    #[arg(long, alias = "clear-image")]
    clear_all: bool,

    /// Fail instead of warning on ignored or clamped options
    #[arg(long)]
    strict: bool,
}

impl From<InitArgs> for InitOptions {
    fn from(args: InitArgs) -> Self {
        Self {
            image: Some(args.image),
            sector_size: args.sector_size,
            table_type: args.table_type,
            entry_count: args.entry_count,
            disk_guid: args.disk_guid,
            boot_code: args.boot_code,
            disk_signature: args.disk_signature,
            dry_run: args.dry_run,
            clear_all: args.clear_all,
            strict: args.strict,
        }
    }
}

fn parse_u32(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid 32-bit value '{}': {}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let request = match cli.command {
        Some(Command::InitTable(args)) => Request::InitTable(args.into()),
        Some(Command::Inspect { image, sector_size }) => Request::Inspect(InspectOptions {
            image: Some(image),
            sector_size,
        }),
        None => {
            Cli::command().print_help()?;
            println!();
            Request::Help
        }
    };

    tracing::debug!("{:?}", request);
    let outcome = run(request, &mut OsRandom);
    print_outcome(&outcome, cli.json)?;

    if !outcome.is_success() {
        process::exit(1);
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        let value = match outcome {
            Outcome::Success(report) => serde_json::json!({
                "outcome": "success",
                "report": serde_json::to_value(report)?,
            }),
            Outcome::Failure(e) => serde_json::json!({
                "outcome": "failure",
                "error": e.to_string(),
            }),
            Outcome::NoWork => serde_json::json!({ "outcome": "no_work" }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match outcome {
        Outcome::Success(Report::Init(report)) => print_init(report),
        Outcome::Success(Report::Inspect(report)) => print_inspect(report),
        Outcome::Failure(e) => eprintln!("Error: {}", e),
        Outcome::NoWork => {}
    }
    Ok(())
}

fn print_init(report: &InitReport) {
    let config = &report.config;
    for warning in &config.warnings {
        println!("Warning: {}", warning);
    }

    if !report.written {
        println!("Dry run: {} was not modified", config.image.display());
        for structure in &report.structures {
            println!();
            print!("{}", structure);
        }
        return;
    }

    println!(
        "Wrote {} partition table to {} ({} sectors of {} bytes)",
        config.table_kind(),
        config.image.display(),
        report.device_sectors,
        config.sector_size
    );
    if let Some(geometry) = &report.geometry {
        println!(
            "Usable LBA range: {}..={}",
            geometry.reserved_sectors,
            geometry.device_sectors - geometry.reserved_sectors
        );
    }
}

fn print_inspect(report: &InspectReport) {
    println!("=== {} ===", report.image.display());
    println!(
        "Size:        {} sectors of {} bytes",
        report.device_sectors, report.sector_size
    );
    println!("Disk sig:    0x{:08X}", report.mbr.disk_signature);
    println!("Protective:  {}", if report.mbr.protective { "yes" } else { "no" });

    for record in &report.mbr.records {
        println!(
            "  Record {}: type 0x{:02X}, LBA {} + {}",
            record.index, record.os_type, record.starting_lba, record.size_in_lba
        );
    }

    if let Some(gpt) = &report.gpt {
        println!();
        println!("=== GPT ===");
        println!("Disk GUID:   {}", gpt.disk_guid);
        println!(
            "Usable LBA:  {}..={}",
            gpt.first_usable_lba, gpt.last_usable_lba
        );
        println!(
            "Entries:     {} ({} used), CRC32 0x{:08X}",
            gpt.entry_count, gpt.used_entries, gpt.entries_crc32
        );
        println!("Headers:     LBA {} and {}", gpt.primary_lba, gpt.backup_lba);
        println!("Consistent:  yes");
    }
}
