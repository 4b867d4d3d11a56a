//! 128-bit identifiers (GUIDs) in RFC 4122 layout

use crate::error::{Error, Result};
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::{Builder, Uuid};

/// Hex digit counts of the canonical `8-4-4-4-12` grouping
const GROUP_LENGTHS: [usize; 5] = [8, 4, 4, 4, 12];

/// A 128-bit identifier
///
/// Stored in canonical (string) byte order. On disk, GPT writes the first
/// three fields little-endian; see [`Identifier::to_disk_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(Uuid);

impl Identifier {
    /// The all-zero identifier
    pub const NIL: Self = Self(Uuid::nil());

    /// Generate a random version 4 identifier from `rng`
    pub fn generate_v4(rng: &mut dyn RandomSource) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Parse the canonical `8-4-4-4-12` hex form (case-insensitive)
    ///
    /// Braced, URN and un-hyphenated forms are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let groups: Vec<&str> = s.split('-').collect();
        if groups.len() != GROUP_LENGTHS.len() {
            return Err(Error::parse(format!(
                "expected 5 hyphen-separated groups in identifier '{}'",
                s
            )));
        }

        for (group, &len) in groups.iter().zip(GROUP_LENGTHS.iter()) {
            if group.len() != len || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::parse(format!(
                    "identifier '{}' is not in 8-4-4-4-12 hex form",
                    s
                )));
            }
        }

        let digits = groups.concat();
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(&digits, &mut bytes)
            .map_err(|e| Error::parse(format!("identifier '{}': {}", s, e)))?;

        Ok(Self(Uuid::from_bytes(bytes)))
    }

    /// Decode the mixed-endian on-disk representation
    pub fn from_disk_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes_le(bytes))
    }

    /// Encode in the mixed-endian on-disk representation
    pub fn to_disk_bytes(&self) -> [u8; 16] {
        self.0.to_bytes_le()
    }

    /// True for the all-zero identifier
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Version nibble
    pub fn version(&self) -> u8 {
        (self.0.as_bytes()[6] >> 4) & 0x0F
    }

    /// Lower-case canonical string
    pub fn format(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
