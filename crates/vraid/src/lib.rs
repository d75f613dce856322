//! A block-level RAID virtualization engine.
//!
//! The engine presents a contiguous logical block address space on top of a
//! fixed set of physical block devices, handling layout, redundancy,
//! concurrent access, single-disk failure, and rebuild. Five levels are
//! supported: striping ([`RaidLevel::Raid0`]), mirroring
//! ([`RaidLevel::Raid1`]), striped mirrors ([`RaidLevel::Raid01`]),
//! dedicated parity ([`RaidLevel::Raid4`]), and rotating parity
//! ([`RaidLevel::Raid5`]).
//!
//! Each disk carries a small header in its physical block 0, which lets an
//! array resume its configuration, broken-disk markings, and rebuild
//! watermarks after a restart. Blocks are fixed at
//! [`BLOCK_SIZE`](vraid_blockdev::BLOCK_SIZE) bytes and data blocks are
//! never cached.
//!
//! # Example
//! ```
//! use vraid::{RaidArray, RaidLevel};
//! use vraid_blockdev::{MemDisk, BLOCK_SIZE};
//!
//! let array = RaidArray::new((0..4).map(|_| MemDisk::new(64)).collect())?;
//! array.initialize(RaidLevel::Raid5)?;
//!
//! array.write(7, &[0xAB; BLOCK_SIZE])?;
//!
//! let mut data = [0u8; BLOCK_SIZE];
//! array.read(7, &mut data)?;
//! assert_eq!(data, [0xAB; BLOCK_SIZE]);
//! # Ok::<(), vraid::RaidError>(())
//! ```

pub mod layout;

mod array;
mod error;
mod gate;
mod header;
mod level;

pub use array::{ArrayInfo, RaidArray};
pub use error::RaidError;
pub use level::{RaidLevel, UnknownLevel};

// Device types show up throughout the public API, so the seam crate is
// re-exported for callers that don't depend on it directly.
pub use vraid_blockdev as blockdev;
