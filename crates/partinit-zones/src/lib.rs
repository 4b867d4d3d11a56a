//! # partinit zones
//!
//! On-disk partition table structures:
//! - **MBR**: protective and legacy Master Boot Records
//! - **GPT**: GUID Partition Table geometry, headers and entry arrays
//!
//! ## Example
//!
//! ```rust
//! use partinit_core::{Identifier, SeededRandom};
//! use partinit_zones::GptLayout;
//!
//! let guid = Identifier::generate_v4(&mut SeededRandom::new(7));
//! let layout = GptLayout::build(20480, 512, 128, guid).unwrap();
//!
//! assert_eq!(layout.primary.alternate_lba, 20479);
//! assert_eq!(layout.backup.partition_entry_lba, 20447);
//! assert!(layout.protective_mbr.is_gpt_protective());
//! ```

pub mod gpt;
pub mod mbr;

pub use gpt::{GptGeometry, GptLayout, GptTable};
pub use mbr::MasterBootRecord;
