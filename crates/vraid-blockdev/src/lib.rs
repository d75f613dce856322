//! Block devices for the vraid engine.
//!
//! Devices are represented by the [`BlockDevice`] trait, which is implemented
//! for byte vectors, the in-memory [`MemDisk`], and the image-file backed
//! [`FileDisk`]. All access is in whole blocks of [`BLOCK_SIZE`] bytes; the
//! errors returned by the trait are [`DeviceError`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Size of one device block in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// One device block.
pub type Block = [u8; BLOCK_SIZE];

/// Errors that can occur when reading or writing a block device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The requested block lies past the end of the device.
    #[error("block {0} is out of range")]
    OutOfBounds(u32),
    /// The underlying medium failed. Not retried at this layer.
    #[error("device i/o failed")]
    Io(#[from] std::io::Error),
}

/// A fixed-geometry disk addressed in whole [`BLOCK_SIZE`] blocks.
///
/// Access is synchronous and unbuffered; callers own the block buffer. The
/// implementation does not retry on error, persistent faults are handled a
/// layer above.
///
/// # Examples
/// ```
/// use vraid_blockdev::{BlockDevice, DeviceError, BLOCK_SIZE};
///
/// let mut disk = vec![0u8; 4 * BLOCK_SIZE];
/// let mut buffer = [0u8; BLOCK_SIZE];
///
/// disk.write_block(2, &[0xAA; BLOCK_SIZE])?;
/// disk.read_block(2, &mut buffer)?;
/// assert_eq!(buffer, [0xAA; BLOCK_SIZE]);
/// # Ok::<(), DeviceError>(())
/// ```
pub trait BlockDevice {
    /// Number of addressable blocks on this device.
    fn block_count(&self) -> u32;

    /// Reads the block at `index` into `buffer`.
    ///
    /// # Errors
    /// Returns an error if `index` is out of bounds or the medium fails.
    fn read_block(&mut self, index: u32, buffer: &mut Block) -> Result<(), DeviceError>;

    /// Writes `buffer` to the block at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is out of bounds or the medium fails.
    fn write_block(&mut self, index: u32, buffer: &Block) -> Result<(), DeviceError>;
}

impl BlockDevice for Vec<u8> {
    fn block_count(&self) -> u32 {
        (self.len() / BLOCK_SIZE) as u32
    }

    fn read_block(&mut self, index: u32, buffer: &mut Block) -> Result<(), DeviceError> {
        let offset = index as usize * BLOCK_SIZE;
        if offset + BLOCK_SIZE > self.len() {
            return Err(DeviceError::OutOfBounds(index));
        }
        buffer.copy_from_slice(&self[offset..offset + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&mut self, index: u32, buffer: &Block) -> Result<(), DeviceError> {
        let offset = index as usize * BLOCK_SIZE;
        if offset + BLOCK_SIZE > self.len() {
            return Err(DeviceError::OutOfBounds(index));
        }
        self[offset..offset + BLOCK_SIZE].copy_from_slice(buffer);
        Ok(())
    }
}

/// An in-memory disk of a fixed number of blocks.
///
/// Mostly useful as a test double; it is cheap to construct and can be moved
/// across threads.
#[derive(Debug, Clone)]
pub struct MemDisk {
    data: Vec<u8>,
}

impl MemDisk {
    /// Creates a zero-filled disk of `blocks` blocks.
    pub fn new(blocks: u32) -> Self {
        Self {
            data: vec![0u8; blocks as usize * BLOCK_SIZE],
        }
    }

    /// Raw contents, block 0 first.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl BlockDevice for MemDisk {
    fn block_count(&self) -> u32 {
        self.data.block_count()
    }

    fn read_block(&mut self, index: u32, buffer: &mut Block) -> Result<(), DeviceError> {
        self.data.read_block(index, buffer)
    }

    fn write_block(&mut self, index: u32, buffer: &Block) -> Result<(), DeviceError> {
        self.data.write_block(index, buffer)
    }
}

/// A disk backed by an image file.
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    blocks: u32,
}

impl FileDisk {
    /// Creates (or truncates) an image file of `blocks` blocks.
    pub fn create<P: AsRef<Path>>(path: P, blocks: u32) -> Result<Self, DeviceError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(blocks as u64 * BLOCK_SIZE as u64)?;
        Ok(Self { file, blocks })
    }

    /// Opens an existing image file. The geometry is derived from the file
    /// length; trailing bytes beyond the last whole block are ignored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DeviceError> {
        let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        let blocks = (file.metadata()?.len() / BLOCK_SIZE as u64) as u32;
        Ok(Self { file, blocks })
    }
}

impl BlockDevice for FileDisk {
    fn block_count(&self) -> u32 {
        self.blocks
    }

    fn read_block(&mut self, index: u32, buffer: &mut Block) -> Result<(), DeviceError> {
        if index >= self.blocks {
            return Err(DeviceError::OutOfBounds(index));
        }
        self.file
            .seek(SeekFrom::Start(index as u64 * BLOCK_SIZE as u64))?;
        self.file.read_exact(buffer)?;
        Ok(())
    }

    fn write_block(&mut self, index: u32, buffer: &Block) -> Result<(), DeviceError> {
        if index >= self.blocks {
            return Err(DeviceError::OutOfBounds(index));
        }
        self.file
            .seek(SeekFrom::Start(index as u64 * BLOCK_SIZE as u64))?;
        self.file.write_all(buffer)?;
        Ok(())
    }
}
