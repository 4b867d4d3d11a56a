//! Block device - sector-addressed view of a disk image

use partinit_core::limits::{self, ZERO_CHUNK_SIZE};
use partinit_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Which directions a block device was opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reads only
    Read,
    /// Writes only
    Write,
    /// Reads and writes
    ReadWrite,
}

impl OpenMode {
    /// Whether reads are permitted
    pub fn can_read(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    /// Whether writes are permitted
    pub fn can_write(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

/// A disk image addressed in sectors (LBA)
///
/// The reported size is the stream length rounded down to whole sectors; a
/// trailing partial sector is never addressed. Byte-oriented reads and writes
/// work from the current position, cover whole sectors internally and advance
/// the position by the number of sectors touched.
///
/// # Example
///
/// ```rust
/// use partinit_pipeline::{BlockDevice, OpenMode};
/// use std::io::Cursor;
///
/// let image = Cursor::new(vec![0u8; 4 * 512 + 100]);
/// let mut disk = BlockDevice::from_stream(image, 512, OpenMode::ReadWrite).unwrap();
/// assert_eq!(disk.size_lba(), 4);
///
/// disk.seek(1).unwrap();
/// disk.write(b"EFI PART").unwrap();
/// assert_eq!(disk.position(), 2);
/// ```
pub struct BlockDevice<S = File> {
    stream: S,
    sector_size: u32,
    size_bytes: u64,
    mode: OpenMode,
    position: u64,
}

impl BlockDevice<File> {
    /// Open a disk image file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened in the requested mode.
    pub fn open(path: &Path, sector_size: u32, mode: OpenMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(mode.can_read())
            .write(mode.can_write())
            .open(path)?;

        tracing::debug!(
            "Opened {} ({:?}, {} byte sectors)",
            path.display(),
            mode,
            sector_size
        );

        Self::from_stream(file, sector_size, mode)
    }
}

impl<S: Read + Write + Seek> BlockDevice<S> {
    /// Wrap any seekable stream
    pub fn from_stream(mut stream: S, sector_size: u32, mode: OpenMode) -> Result<Self> {
        if sector_size == 0 {
            return Err(Error::validation("Sector size must be non-zero"));
        }

        let length = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        let size_bytes = limits::round_down(length, sector_size as u64);

        Ok(Self {
            stream,
            sector_size,
            size_bytes,
            mode,
            position: 0,
        })
    }

    /// Sector size in bytes
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Usable size in bytes (whole sectors only)
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Usable size in sectors
    pub fn size_lba(&self) -> u64 {
        self.size_bytes / self.sector_size as u64
    }

    /// Mode the device was opened with
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Current position in sectors
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the current position to `lba`
    pub fn seek(&mut self, lba: u64) -> Result<()> {
        if lba >= self.size_lba() {
            return Err(Error::OutOfRange {
                lba,
                count: 1,
                size: self.size_lba(),
            });
        }
        self.position = lba;
        Ok(())
    }

    /// Number of whole sectors needed to hold `len` bytes
    pub fn sectors_for(&self, len: usize) -> u64 {
        (len as u64).div_ceil(self.sector_size as u64)
    }

    /// Read whole sectors starting at `lba` into `buf`
    ///
    /// `buf` must be a multiple of the sector size. The current position is
    /// left unchanged.
    pub fn read_lba(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        self.require(self.mode.can_read(), "read")?;
        let count = self.whole_sectors(buf.len())?;
        if count == 0 {
            return Ok(());
        }
        self.check_range(lba, count)?;

        self.stream.seek(SeekFrom::Start(self.byte_offset(lba)))?;
        self.stream.read_exact(buf)?;
        Ok(())
    }

    /// Write whole sectors starting at `lba`
    ///
    /// `data` must be a multiple of the sector size. The current position is
    /// left unchanged.
    pub fn write_lba(&mut self, lba: u64, data: &[u8]) -> Result<()> {
        self.require(self.mode.can_write(), "write")?;
        let count = self.whole_sectors(data.len())?;
        if count == 0 {
            return Ok(());
        }
        self.check_range(lba, count)?;

        tracing::trace!("Writing {} sector(s) at LBA {}", count, lba);
        self.stream.seek(SeekFrom::Start(self.byte_offset(lba)))?;
        self.stream.write_all(data)?;
        Ok(())
    }

    /// Read `buf.len()` bytes from the current position
    ///
    /// Whole sectors are read; only the requested bytes are copied back.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let count = self.sectors_for(buf.len());
        let mut sectors = vec![0u8; self.span_len(count)?];
        self.read_lba(self.position, &mut sectors)?;
        buf.copy_from_slice(&sectors[..buf.len()]);
        self.position += count;
        Ok(())
    }

    /// Write `data` at the current position
    ///
    /// The tail of the last sector beyond `data` is zero-filled.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let count = self.sectors_for(data.len());
        let mut sectors = vec![0u8; self.span_len(count)?];
        sectors[..data.len()].copy_from_slice(data);
        self.write_lba(self.position, &sectors)?;
        self.position += count;
        Ok(())
    }

    /// Zero `count` sectors starting at `lba`
    pub fn zero_lba(&mut self, lba: u64, count: u64) -> Result<()> {
        self.require(self.mode.can_write(), "write")?;
        if count == 0 {
            return Ok(());
        }
        self.check_range(lba, count)?;

        let sectors_per_chunk = (ZERO_CHUNK_SIZE as u64 / self.sector_size as u64).max(1);
        let chunk = vec![0u8; (sectors_per_chunk.min(count) * self.sector_size as u64) as usize];

        let mut done = 0u64;
        while done < count {
            let step = sectors_per_chunk.min(count - done);
            let len = (step * self.sector_size as u64) as usize;
            self.write_lba(lba + done, &chunk[..len])?;
            done += step;
        }

        tracing::debug!("Zeroed {} sector(s) at LBA {}", count, lba);
        Ok(())
    }

    /// Flush buffered writes to the backing stream
    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying stream
    pub fn into_inner(mut self) -> Result<S> {
        if self.mode.can_write() {
            self.flush()?;
        }
        Ok(self.stream)
    }

    fn span_len(&self, count: u64) -> Result<usize> {
        limits::u64_to_usize(count * self.sector_size as u64, "Sector span")
    }

    fn byte_offset(&self, lba: u64) -> u64 {
        lba * self.sector_size as u64
    }

    fn whole_sectors(&self, len: usize) -> Result<u64> {
        if len % self.sector_size as usize != 0 {
            return Err(Error::invalid_operation(format!(
                "Buffer of {} bytes is not a whole number of {} byte sectors",
                len, self.sector_size
            )));
        }
        Ok(len as u64 / self.sector_size as u64)
    }

    fn check_range(&self, lba: u64, count: u64) -> Result<()> {
        let size = self.size_lba();
        match lba.checked_add(count) {
            Some(end) if end <= size => Ok(()),
            _ => Err(Error::OutOfRange { lba, count, size }),
        }
    }

    fn require(&self, allowed: bool, what: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(Error::invalid_operation(format!(
                "Device opened {:?} does not permit {}",
                self.mode, what
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::NamedTempFile;

    fn device(bytes: usize) -> BlockDevice<Cursor<Vec<u8>>> {
        BlockDevice::from_stream(Cursor::new(vec![0u8; bytes]), 512, OpenMode::ReadWrite).unwrap()
    }

    #[test]
    fn test_size_truncates_partial_sector() {
        let disk = device(10 * 512 + 511);
        assert_eq!(disk.size_lba(), 10);
        assert_eq!(disk.size_bytes(), 5120);
    }

    #[test]
    fn test_write_pads_and_read_trims() {
        let mut disk = device(4 * 512);
        disk.seek(2).unwrap();
        disk.write(b"hello").unwrap();
        assert_eq!(disk.position(), 3);

        let mut sector = vec![0xFFu8; 512];
        disk.read_lba(2, &mut sector).unwrap();
        assert_eq!(&sector[..5], b"hello");
        assert!(sector[5..].iter().all(|&b| b == 0));

        disk.seek(2).unwrap();
        let mut buf = [0u8; 3];
        disk.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hel");
        assert_eq!(disk.position(), 3);
    }

    #[test]
    fn test_multi_sector_write() {
        let mut disk = device(4 * 512);
        let data = vec![0xABu8; 600];
        disk.seek(0).unwrap();
        disk.write(&data).unwrap();
        assert_eq!(disk.position(), 2);

        let inner = disk.into_inner().unwrap().into_inner();
        assert!(inner[..600].iter().all(|&b| b == 0xAB));
        assert!(inner[600..1024].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_out_of_range() {
        let mut disk = device(4 * 512);
        assert!(matches!(disk.seek(4), Err(Error::OutOfRange { lba: 4, .. })));

        let mut buf = vec![0u8; 1024];
        assert!(matches!(
            disk.read_lba(3, &mut buf),
            Err(Error::OutOfRange { lba: 3, count: 2, size: 4 })
        ));

        disk.seek(3).unwrap();
        assert!(matches!(disk.write(&[1u8; 513]), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_partial_buffer_rejected_for_lba_io() {
        let mut disk = device(4 * 512);
        let mut buf = vec![0u8; 100];
        assert!(matches!(
            disk.read_lba(0, &mut buf),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_read_only_mode_rejects_writes() {
        let mut disk =
            BlockDevice::from_stream(Cursor::new(vec![0u8; 2048]), 512, OpenMode::Read).unwrap();
        assert!(matches!(
            disk.write_lba(0, &[0u8; 512]),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(disk.zero_lba(0, 1), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_write_only_mode_rejects_reads() {
        let mut disk =
            BlockDevice::from_stream(Cursor::new(vec![0u8; 2048]), 512, OpenMode::Write).unwrap();
        let mut buf = [0u8; 512];
        assert!(matches!(
            disk.read_lba(0, &mut buf),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_zero_lba_spans_chunks() {
        let sectors = (ZERO_CHUNK_SIZE / 512) * 2 + 3;
        let mut disk = BlockDevice::from_stream(
            Cursor::new(vec![0xEEu8; sectors * 512]),
            512,
            OpenMode::ReadWrite,
        )
        .unwrap();
        disk.zero_lba(1, sectors as u64 - 2).unwrap();

        let inner = disk.into_inner().unwrap().into_inner();
        assert!(inner[..512].iter().all(|&b| b == 0xEE));
        assert!(inner[512..inner.len() - 512].iter().all(|&b| b == 0));
        assert!(inner[inner.len() - 512..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_open_file() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(8 * 4096 + 17).unwrap();

        let mut disk = BlockDevice::open(tmp.path(), 4096, OpenMode::ReadWrite).unwrap();
        assert_eq!(disk.size_lba(), 8);
        disk.write_lba(7, &vec![1u8; 4096]).unwrap();
        disk.flush().unwrap();

        let bytes = std::fs::read(tmp.path()).unwrap();
        assert_eq!(bytes.len(), 8 * 4096 + 17);
        assert!(bytes[7 * 4096..8 * 4096].iter().all(|&b| b == 1));
    }

    #[test]
    fn test_open_file_write_only() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(4 * 512).unwrap();

        let mut disk = BlockDevice::open(tmp.path(), 512, OpenMode::Write).unwrap();
        assert_eq!(disk.mode(), OpenMode::Write);
        assert_eq!(disk.size_lba(), 4);
        disk.write_lba(3, &[7u8; 512]).unwrap();
        let mut buf = [0u8; 512];
        assert!(matches!(
            disk.read_lba(0, &mut buf),
            Err(Error::InvalidOperation(_))
        ));
        disk.flush().unwrap();

        let bytes = std::fs::read(tmp.path()).unwrap();
        assert!(bytes[3 * 512..].iter().all(|&b| b == 7));
    }

    #[test]
    fn test_open_missing_file() {
        let result = BlockDevice::open(
            Path::new("/nonexistent/disk.img"),
            512,
            OpenMode::ReadWrite,
        );
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_zero_sector_size_rejected() {
        let result = BlockDevice::from_stream(Cursor::new(vec![0u8; 512]), 0, OpenMode::Read);
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
