//!
//! A Stream provides random access to a growable set of raw bytes
//!
//! Streams only ever grow; nothing in the engine truncates one. The heap
//! that owns a stream writes its own metadata prefix at offset zero, so a
//! file-backed stream carries no header of its own.
//!
//! The file-backed implementation keeps the whole data file memory-mapped.
//! Growing flushes the map, extends the file and maps it again; offsets that
//! were handed out stay valid because the file only gets longer.
//!

use std::fs;
use std::path::{Path, PathBuf};

use memmap::{MmapMut, MmapOptions};

use crate::error::{Error, Result};


pub trait Stream: Send + Sync {
    /// Fills `buf` from the bytes at `offset`
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `bytes` at `offset`; the range must already be inside the stream
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;

    fn len(&self) -> u64;

    /// Ensures the stream is at least `min_len` bytes long
    fn grow(&mut self, min_len: u64) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}


/// Memory-backed stream for scratch stores and tests
pub struct MemoryStream {
    bytes: Vec<u8>,
}

impl MemoryStream {
    pub fn new() -> MemoryStream {
        MemoryStream { bytes: Vec::new() }
    }
}

impl Default for MemoryStream {
    fn default() -> MemoryStream {
        MemoryStream::new()
    }
}

impl Stream for MemoryStream {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();

        if end > self.bytes.len() {
            return Err(Error::Corrupt("read beyond end of stream"));
        }

        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + bytes.len();

        if end > self.bytes.len() {
            return Err(Error::Corrupt("write beyond end of stream"));
        }

        self.bytes[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn grow(&mut self, min_len: u64) -> Result<()> {
        if min_len as usize > self.bytes.len() {
            self.bytes.resize(min_len as usize, 0);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}


/// The smallest file we are willing to map
const MIN_FILE_SIZE: u64 = 4096;

/// File-backed stream; the whole file stays memory-mapped
pub struct FileStream {
    path:     PathBuf,
    file:     fs::File,
    map:      MmapMut,
    max_size: u64,
}

impl FileStream {
    /// Opens the data file at `path`, creating it at `initial_size` if it
    /// does not exist yet
    pub fn open(path: &Path, initial_size: u64, max_size: u64) -> Result<FileStream> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.set_len(initial_size.max(MIN_FILE_SIZE))?;
        }

        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(FileStream {
            path: PathBuf::from(path),
            file,
            map,
            max_size,
        })
    }

    fn remap(&mut self, new_len: u64) -> Result<()> {
        self.map.flush()?;
        self.file.set_len(new_len)?;
        self.map = unsafe { MmapOptions::new().map_mut(&self.file)? };
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Stream for FileStream {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();

        if end > self.map.len() {
            return Err(Error::Corrupt("read beyond end of stream"));
        }

        buf.copy_from_slice(&self.map[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + bytes.len();

        if end > self.map.len() {
            return Err(Error::Corrupt("write beyond end of stream"));
        }

        self.map[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn grow(&mut self, min_len: u64) -> Result<()> {
        let len = self.len();
        if min_len <= len {
            return Ok(());
        }

        if min_len > self.max_size {
            return Err(Error::OutOfSpace { requested: min_len });
        }

        // double until it fits, then clamp against the configured ceiling
        let mut new_len = len.max(MIN_FILE_SIZE);
        while new_len < min_len {
            new_len *= 2;
        }
        let new_len = new_len.min(self.max_size).max(min_len);

        self.remap(new_len)
    }

    fn flush(&mut self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}
