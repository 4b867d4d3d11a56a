//! Hex rendering of structures for dry runs

use serde::Serialize;

/// Bytes shown per dump line
const BYTES_PER_LINE: usize = 16;

/// A structure that would be written, rendered for display
#[derive(Debug, Clone, Serialize)]
pub struct RenderedStructure {
    /// Human-readable name, e.g. "Primary GPT header"
    pub name: String,
    /// Sector the structure is written to
    pub lba: u64,
    /// Encoded length in bytes
    pub len: usize,
    /// One string per line of 16 bytes
    pub hex: Vec<String>,
}

impl RenderedStructure {
    pub fn new(name: impl Into<String>, lba: u64, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            lba,
            len: bytes.len(),
            hex: hex_lines(bytes),
        }
    }
}

impl std::fmt::Display for RenderedStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} at LBA {} ({} bytes):", self.name, self.lba, self.len)?;
        for line in &self.hex {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Lower-case hex, space separated, 16 bytes per line
pub fn hex_lines(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(i, chunk)| {
            let cells: Vec<String> = chunk.iter().map(|b| hex::encode([*b])).collect();
            format!("{:04x}: {}", i * BYTES_PER_LINE, cells.join(" "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_lines_layout() {
        let bytes: Vec<u8> = (0u8..20).collect();
        let lines = hex_lines(&bytes);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "0000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f"
        );
        assert_eq!(lines[1], "0010: 10 11 12 13");
    }

    #[test]
    fn test_header_renders_six_lines() {
        let rendered = RenderedStructure::new("Primary GPT header", 1, &[0xAB; 92]);
        assert_eq!(rendered.hex.len(), 6);
        assert_eq!(rendered.len, 92);

        let text = rendered.to_string();
        assert!(text.starts_with("Primary GPT header at LBA 1 (92 bytes):\n"));
        assert!(text.contains("0050: ab ab ab ab ab ab ab ab ab ab ab ab\n"));
    }

    #[test]
    fn test_empty_input() {
        assert!(hex_lines(&[]).is_empty());
    }
}
