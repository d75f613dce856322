//! The per-disk header block.
//!
//! Physical block 0 of every disk carries a small header describing the
//! array as that disk last saw it: whether an array is configured, which
//! level, whether the disk itself is broken, and the disk's watermark. The
//! header is the engine's only persistent metadata; it is rewritten whole on
//! every state change and the rest of the block is kept zero.

use vraid_blockdev::Block;

use crate::RaidLevel;

/// `state` value of a disk that belongs to a configured array.
const ACTIVE_MAGIC: u32 = 772_024;
/// `broken` value of a disk that was marked failed.
const BROKEN_MAGIC: u32 = 773_024;

/// Raw header layout, host-native byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct DiskHeader {
    state: u32,
    kind: u32,
    broken: u32,
    watermark: u32,
}

impl DiskHeader {
    /// Composes the header for one disk from the current engine state.
    pub fn new(level: Option<RaidLevel>, broken: bool, watermark: u32) -> Self {
        Self {
            state: if level.is_some() { ACTIVE_MAGIC } else { 0 },
            kind: level.map_or(0, RaidLevel::to_u32),
            broken: if broken { BROKEN_MAGIC } else { 0 },
            watermark,
        }
    }

    pub fn decode(block: &Block) -> Self {
        // The block buffer is byte-aligned, so the header is read unaligned.
        bytemuck::pod_read_unaligned(&block[..size_of::<Self>()])
    }

    pub fn encode(&self, block: &mut Block) {
        block.fill(0);
        block[..size_of::<Self>()].copy_from_slice(bytemuck::bytes_of(self));
    }

    pub fn is_active(&self) -> bool {
        self.state == ACTIVE_MAGIC
    }

    /// The configured level, when the header is active and carries a known
    /// tag.
    pub fn level(&self) -> Option<RaidLevel> {
        self.is_active().then(|| RaidLevel::from_u32(self.kind)).flatten()
    }

    pub fn is_broken(&self) -> bool {
        self.broken == BROKEN_MAGIC
    }

    pub fn watermark(&self) -> u32 {
        self.watermark
    }
}
