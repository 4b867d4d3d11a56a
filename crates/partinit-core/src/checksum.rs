//! CRC-32 (IEEE 802.3 / ISO-HDLC) as used by GPT headers and entry arrays

/// Standard initial register value
pub const CRC32_INIT: u32 = 0xFFFF_FFFF;

/// Compute the CRC-32 of `data` with the standard initial register value
pub fn crc32(data: &[u8]) -> u32 {
    crc32_with_init(data, CRC32_INIT)
}

/// Compute the CRC-32 of `data` starting from the raw register value `init`
///
/// The result carries the standard final complement. `crc32fast` seeds its
/// hasher with an already-complemented checksum, hence the inversion here.
pub fn crc32_with_init(data: &[u8], init: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(!init);
    hasher.update(data);
    hasher.finalize()
}
