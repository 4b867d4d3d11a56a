//! # partinit pipeline
//!
//! Sector-addressed I/O over disk images.
//!
//! - **BlockDevice**: LBA-addressed reads and writes over any seekable stream,
//!   with byte-ranged helpers that round up to whole sectors
//!
//! ## Example
//!
//! ```rust,no_run
//! use partinit_pipeline::{BlockDevice, OpenMode};
//! use std::path::Path;
//!
//! let mut disk = BlockDevice::open(Path::new("disk.img"), 512, OpenMode::ReadWrite).unwrap();
//! let mut sector = [0u8; 512];
//! disk.read_lba(0, &mut sector).unwrap();
//! println!("{} sectors", disk.size_lba());
//! ```

pub mod block;

pub use block::{BlockDevice, OpenMode};
