//! # partinit core
//!
//! Foundations shared by the partition table initializer:
//! - **checksum**: CRC-32 as required by GPT
//! - **ident**: 128-bit identifiers (disk GUIDs)
//! - **random**: injectable randomness for identifiers and disk signatures
//! - **limits**: size guards applied before anything is written
//!
//! ## Example
//!
//! ```rust
//! use partinit_core::{checksum::crc32, Identifier, SeededRandom};
//!
//! let id = Identifier::generate_v4(&mut SeededRandom::new(1));
//! assert_eq!(id.version(), 4);
//! assert_eq!(crc32(b"123456789"), 0xCBF43926);
//! ```

pub mod checksum;
pub mod error;
pub mod ident;
pub mod limits;
pub mod random;

// Re-export commonly used items
pub use error::{Error, Result};
pub use ident::Identifier;
pub use random::{OsRandom, RandomSource, SeededRandom};
