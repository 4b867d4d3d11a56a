//! Size limits and arithmetic guards
//!
//! Everything here runs during option resolution, before the image is
//! touched, so failures are reported as validation errors.

use crate::Error;
use std::path::Path;

/// Smallest sector size accepted (one MBR must fit in sector 0)
pub const MIN_SECTOR_SIZE: u32 = 512;

/// Maximum allocation size for a single buffer (256 MB)
pub const MAX_ALLOCATION_SIZE: usize = 256 * 1024 * 1024;

/// Chunk used when zeroing large ranges of the image (1 MB)
pub const ZERO_CHUNK_SIZE: usize = 1024 * 1024;

/// Validate that a size is within allocation limits
pub fn validate_allocation_size(size: u64, limit: usize, context: &str) -> crate::Result<usize> {
    if size > limit as u64 {
        return Err(Error::validation(format!(
            "{} size {} exceeds limit {}",
            context, size, limit
        )));
    }

    size.try_into()
        .map_err(|_| Error::validation(format!("{} size exceeds platform limits", context)))
}

/// Safely multiply two u64 values with overflow checking
pub fn checked_multiply_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| Error::validation(format!("{}: multiplication overflow", context)))
}

/// Safely convert u64 to usize with platform checking
pub fn u64_to_usize(value: u64, context: &str) -> crate::Result<usize> {
    value.try_into().map_err(|_| {
        Error::validation(format!(
            "{}: value {} exceeds platform usize limit",
            context, value
        ))
    })
}

/// Validate sector size is a power of two of at least 512 bytes
///
/// There is no fixed upper bound; a sector only has to fit in one buffer.
pub fn validate_sector_size(sector_size: u32) -> crate::Result<()> {
    if sector_size < MIN_SECTOR_SIZE {
        return Err(Error::validation(format!(
            "Invalid sector size: {} (must be at least {})",
            sector_size, MIN_SECTOR_SIZE
        )));
    }

    if !sector_size.is_power_of_two() {
        return Err(Error::validation(format!(
            "Sector size {} is not a power of 2",
            sector_size
        )));
    }

    validate_allocation_size(sector_size as u64, MAX_ALLOCATION_SIZE, "Sector")?;
    Ok(())
}

/// Require `path` to name an existing regular file
pub fn validate_regular_file(path: &Path, what: &str) -> crate::Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::configuration(format!("{} path is empty", what)));
    }

    let metadata = std::fs::metadata(path).map_err(|e| {
        Error::configuration(format!("{} '{}' is inaccessible: {}", what, path.display(), e))
    })?;

    if !metadata.is_file() {
        return Err(Error::configuration(format!(
            "{} '{}' is not a regular file",
            what,
            path.display()
        )));
    }

    Ok(())
}

/// Round `value` up to a multiple of `align` (`align` must be non-zero)
pub fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// Round `value` down to a multiple of `align` (`align` must be non-zero)
pub fn round_down(value: u64, align: u64) -> u64 {
    value - value % align
}
