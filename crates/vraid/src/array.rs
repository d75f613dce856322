//! The engine proper: a [`RaidArray`] owns the physical disks and serves
//! the data and administrative operations on top of them.

use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use vraid_blockdev::{BLOCK_SIZE, Block, BlockDevice};

use crate::RaidError;
use crate::gate::{Admission, ParityGate};
use crate::header::DiskHeader;
use crate::layout::Layout;
use crate::level::RaidLevel;

/// Array geometry as reported to callers, in reporting order: logical block
/// count, block size, data disk count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub logical_blocks: u32,
    pub block_size: u32,
    pub data_disks: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct DiskState {
    broken: bool,
    watermark: u32,
}

#[derive(Debug)]
struct ArrayState {
    level: Option<RaidLevel>,
    disks: Vec<DiskState>,
}

/// A RAID array over a fixed set of equally sized block devices.
///
/// The array exposes a contiguous logical block address space whose size
/// depends on the configured [`RaidLevel`]; physical block 0 of every disk is
/// reserved for the engine's header and never mapped. All operations take
/// `&self`; the array is safe to share across threads behind an
/// [`std::sync::Arc`] as long as the devices are [`Send`].
///
/// Runtime state (level, broken disks, watermarks) is hydrated from the disk
/// headers the first time any operation runs, so an array value constructed
/// over previously used disks resumes where the last process left off.
pub struct RaidArray<D> {
    lanes: Vec<Mutex<D>>,
    state: Mutex<ArrayState>,
    admission: Admission,
    parity: ParityGate,
    hydrate: Once,
    disk_count: u32,
    blocks_per_disk: u32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn xor_into(acc: &mut Block, other: &Block) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= *b;
    }
}

impl<D: BlockDevice> RaidArray<D> {
    /// Builds an array over `devices`.
    ///
    /// # Errors
    /// Returns [`RaidError::ShapeMismatch`] when no devices are given, when
    /// the devices disagree on their block count, or when a device is too
    /// small to hold the header block plus at least one data block.
    pub fn new(devices: Vec<D>) -> Result<Self, RaidError> {
        let Some(first) = devices.first() else {
            return Err(RaidError::ShapeMismatch);
        };
        let blocks_per_disk = first.block_count();
        if blocks_per_disk < 2
            || devices.iter().any(|d| d.block_count() != blocks_per_disk)
        {
            return Err(RaidError::ShapeMismatch);
        }

        let disk_count = devices.len() as u32;
        Ok(Self {
            lanes: devices.into_iter().map(Mutex::new).collect(),
            state: Mutex::new(ArrayState {
                level: None,
                disks: vec![DiskState::default(); disk_count as usize],
            }),
            admission: Admission::new(),
            parity: ParityGate::new(),
            hydrate: Once::new(),
            disk_count,
            blocks_per_disk,
        })
    }

    /// Tears the array down and hands the devices back, in disk order.
    pub fn into_devices(self) -> Vec<D> {
        self.lanes
            .into_iter()
            .map(|lane| lane.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }

    /// Configures the array with `level` and writes an active header to
    /// every disk.
    pub fn initialize(&self, level: RaidLevel) -> Result<(), RaidError> {
        let _op = self.admission.exclusive();
        self.ensure_hydrated()?;

        let broken = {
            let mut state = lock(&self.state);
            if state.level.is_some() {
                return Err(RaidError::AlreadyConfigured);
            }
            if !level.fits_disk_count(self.disk_count) {
                return Err(RaidError::ShapeMismatch);
            }
            state.level = Some(level);
            for disk in &mut state.disks {
                disk.watermark = 0;
            }
            state.disks.iter().map(|d| d.broken).collect::<Vec<_>>()
        };

        log::debug!("initializing {level} across {} disks", self.disk_count);
        let mut block = [0u8; BLOCK_SIZE];
        for disk in 1..=self.disk_count {
            DiskHeader::new(Some(level), broken[disk as usize - 1], 0).encode(&mut block);
            self.lane_write(disk, 0, &block)?;
        }
        Ok(())
    }

    /// Unconfigures the array, writing an inactive header to every disk.
    /// Broken markings survive destruction.
    pub fn destroy(&self) -> Result<(), RaidError> {
        let _op = self.admission.exclusive();
        self.ensure_hydrated()?;

        let broken = {
            let mut state = lock(&self.state);
            if state.level.is_none() {
                return Err(RaidError::NotConfigured);
            }
            state.level = None;
            for disk in &mut state.disks {
                disk.watermark = 0;
            }
            state.disks.iter().map(|d| d.broken).collect::<Vec<_>>()
        };

        log::debug!("destroying the array");
        let mut block = [0u8; BLOCK_SIZE];
        for disk in 1..=self.disk_count {
            DiskHeader::new(None, broken[disk as usize - 1], 0).encode(&mut block);
            self.lane_write(disk, 0, &block)?;
        }
        Ok(())
    }

    /// Reads logical block `lbn` into `out`, which must hold at least
    /// [`BLOCK_SIZE`] bytes. Serves the block from its mirror, or
    /// reconstructs it from parity, when its disk is broken.
    pub fn read(&self, lbn: u32, out: &mut [u8]) -> Result<(), RaidError> {
        let _op = self.admission.shared();
        self.ensure_hydrated()?;

        let mut block = [0u8; BLOCK_SIZE];
        self.block_read(lbn, &mut block)?;
        let Some(out) = out.get_mut(..BLOCK_SIZE) else {
            return Err(RaidError::CopyOut);
        };
        out.copy_from_slice(&block);
        Ok(())
    }

    /// Writes the first [`BLOCK_SIZE`] bytes of `data` to logical block
    /// `lbn`, updating the mirror or parity block as the level requires.
    pub fn write(&self, lbn: u32, data: &[u8]) -> Result<(), RaidError> {
        let _op = self.admission.shared();
        self.ensure_hydrated()?;

        let Some(data) = data.get(..BLOCK_SIZE) else {
            return Err(RaidError::CopyIn);
        };
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(data);
        self.block_write(lbn, &mut block)
    }

    /// Marks a disk broken and resets its watermark. The header on the
    /// failed disk is rewritten so the marking survives a restart.
    pub fn fail_disk(&self, disk: u32) -> Result<(), RaidError> {
        let _op = self.admission.exclusive();
        self.ensure_hydrated()?;

        if disk < 1 || disk > self.disk_count {
            return Err(RaidError::BadDisk(disk));
        }
        let level = {
            let mut state = lock(&self.state);
            let slot = &mut state.disks[disk as usize - 1];
            if slot.broken {
                return Err(RaidError::AlreadyBroken);
            }
            slot.broken = true;
            slot.watermark = 0;
            state.level
        };

        log::debug!("disk {disk} marked broken");
        let mut block = [0u8; BLOCK_SIZE];
        DiskHeader::new(level, true, 0).encode(&mut block);
        self.lane_write(disk, 0, &block)
    }

    /// Clears a disk's broken marking and rebuilds its contents from its
    /// peers, bounded by the healthy peers' watermarks.
    pub fn repair_disk(&self, disk: u32) -> Result<(), RaidError> {
        let _op = self.admission.exclusive();
        self.ensure_hydrated()?;

        if disk < 1 || disk > self.disk_count {
            return Err(RaidError::BadDisk(disk));
        }
        let (level, watermark) = {
            let mut state = lock(&self.state);
            if !state.disks[disk as usize - 1].broken {
                return Err(RaidError::NotBroken);
            }
            let watermark = if state.level.is_some() {
                state
                    .disks
                    .iter()
                    .enumerate()
                    .filter(|(i, d)| *i != disk as usize - 1 && !d.broken)
                    .map(|(_, d)| d.watermark)
                    .max()
                    .unwrap_or(0)
            } else {
                0
            };
            let slot = &mut state.disks[disk as usize - 1];
            slot.broken = false;
            slot.watermark = watermark;
            (state.level, watermark)
        };

        log::debug!("disk {disk} repaired");
        let mut block = [0u8; BLOCK_SIZE];
        DiskHeader::new(level, false, watermark).encode(&mut block);
        self.lane_write(disk, 0, &block)?;
        self.restore(disk)
    }

    /// Reports the array geometry.
    pub fn info(&self) -> Result<ArrayInfo, RaidError> {
        let _op = self.admission.shared();
        self.ensure_hydrated()?;

        let level = lock(&self.state).level.ok_or(RaidError::NotConfigured)?;
        let layout = self.layout(level);
        Ok(ArrayInfo {
            logical_blocks: layout.logical_blocks(),
            block_size: BLOCK_SIZE as u32,
            data_disks: layout.data_disks(),
        })
    }

    fn layout(&self, level: RaidLevel) -> Layout {
        Layout {
            level,
            disks: self.disk_count,
            blocks_per_disk: self.blocks_per_disk,
        }
    }

    fn snapshot(&self) -> (Option<RaidLevel>, Vec<bool>) {
        let state = lock(&self.state);
        (state.level, state.disks.iter().map(|d| d.broken).collect())
    }

    /// Loads the headers from all disks, once per process lifetime. The
    /// first active header fixes the level; every header contributes its own
    /// broken flag, and active headers contribute their watermark.
    fn ensure_hydrated(&self) -> Result<(), RaidError> {
        let mut result = Ok(());
        self.hydrate.call_once(|| result = self.load_headers());
        result
    }

    fn load_headers(&self) -> Result<(), RaidError> {
        let mut block = [0u8; BLOCK_SIZE];
        let mut level = None;
        let mut disks = Vec::with_capacity(self.disk_count as usize);
        for disk in 1..=self.disk_count {
            self.lane_read(disk, 0, &mut block)?;
            let header = DiskHeader::decode(&block);
            if header.is_active() && level.is_none() {
                level = header.level();
            }
            disks.push(DiskState {
                broken: header.is_broken(),
                watermark: if header.is_active() { header.watermark() } else { 0 },
            });
        }

        match level {
            Some(level) => log::debug!("hydrated a {level} array from disk headers"),
            None => log::debug!("no active array found on disk"),
        }
        let mut state = lock(&self.state);
        state.level = level;
        state.disks = disks;
        Ok(())
    }

    /// Raw single-disk read: lane lock and device access only.
    fn lane_read(&self, disk: u32, block: u32, buf: &mut Block) -> Result<(), RaidError> {
        let mut dev = lock(&self.lanes[disk as usize - 1]);
        dev.read_block(block, buf)?;
        Ok(())
    }

    /// Raw single-disk write: lane lock and device access only. Does not
    /// touch the watermark.
    fn lane_write(&self, disk: u32, block: u32, buf: &Block) -> Result<(), RaidError> {
        let mut dev = lock(&self.lanes[disk as usize - 1]);
        dev.write_block(block, buf)?;
        Ok(())
    }

    /// Data-path read: passes the parity gate shared on the parity levels,
    /// then reads under the lane lock.
    fn gated_read(
        &self,
        level: RaidLevel,
        disk: u32,
        block: u32,
        buf: &mut Block,
    ) -> Result<(), RaidError> {
        let _shared = level.uses_parity().then(|| self.parity.shared());
        self.lane_read(disk, block, buf)
    }

    /// Data-path write: passes the parity gate shared on the parity levels,
    /// writes under the lane lock, and advances the disk's watermark while
    /// still holding the lane.
    fn gated_write(
        &self,
        level: RaidLevel,
        disk: u32,
        block: u32,
        buf: &Block,
    ) -> Result<(), RaidError> {
        let _shared = level.uses_parity().then(|| self.parity.shared());
        let mut dev = lock(&self.lanes[disk as usize - 1]);
        dev.write_block(block, buf)?;

        let header = {
            let mut state = lock(&self.state);
            let slot = &mut state.disks[disk as usize - 1];
            if slot.watermark >= block {
                return Ok(());
            }
            slot.watermark = block;
            DiskHeader::new(state.level, false, block)
        };
        let mut header_block = [0u8; BLOCK_SIZE];
        header.encode(&mut header_block);
        dev.write_block(0, &header_block)?;
        Ok(())
    }

    fn block_read(&self, lbn: u32, buf: &mut Block) -> Result<(), RaidError> {
        let (level, broken) = self.snapshot();
        let level = level.ok_or(RaidError::NotConfigured)?;
        let layout = self.layout(level);
        if lbn >= layout.logical_blocks() {
            return Err(RaidError::BadBlock(lbn));
        }

        let disk = layout.disk_of(lbn);
        let block = layout.block_of(lbn);
        if !broken[disk as usize - 1] {
            return self.gated_read(level, disk, block, buf);
        }

        let Some(peer) = layout.parity_disk_of(disk, lbn) else {
            return Err(RaidError::ReadBroken);
        };
        if broken[peer as usize - 1] {
            return Err(RaidError::ReadBroken);
        }
        self.gated_read(level, peer, block, buf)?;
        if !level.uses_parity() {
            return Ok(());
        }

        // Reconstruction needs every remaining disk; a second failure means
        // the stripe is gone.
        if (1..=self.disk_count).any(|d| d != disk && broken[d as usize - 1]) {
            return Err(RaidError::ReadBroken);
        }
        let mut temp = [0u8; BLOCK_SIZE];
        for other in 1..=self.disk_count {
            if other == disk || other == peer {
                continue;
            }
            self.gated_read(level, other, block, &mut temp)?;
            xor_into(buf, &temp);
        }
        log::trace!("reconstructed block {lbn} around broken disk {disk}");
        Ok(())
    }

    fn block_write(&self, lbn: u32, buf: &mut Block) -> Result<(), RaidError> {
        let (level, broken) = self.snapshot();
        let level = level.ok_or(RaidError::NotConfigured)?;
        let layout = self.layout(level);
        if lbn >= layout.logical_blocks() {
            return Err(RaidError::BadBlock(lbn));
        }

        let disk = layout.disk_of(lbn);
        let block = layout.block_of(lbn);
        let mut primary = Err(RaidError::WriteBroken);
        if !broken[disk as usize - 1] {
            self.gated_write(level, disk, block, buf)?;
            primary = Ok(());
        }
        if level == RaidLevel::Raid0 {
            return primary;
        }

        let Some(peer) = layout.parity_disk_of(disk, lbn) else {
            return primary;
        };
        if broken[peer as usize - 1] {
            // The redundant copy is unavailable; report whatever the primary
            // write achieved.
            return primary;
        }
        if !level.uses_parity() {
            self.gated_write(level, peer, block, buf)?;
            return Ok(());
        }

        // Parity can only be maintained with every peer readable.
        if (1..=self.disk_count).any(|d| d != disk && broken[d as usize - 1]) {
            return primary;
        }
        let _locked = self.parity.locked();
        let mut temp = [0u8; BLOCK_SIZE];
        for other in 1..=self.disk_count {
            if other == disk || other == peer {
                continue;
            }
            self.lane_read(other, block, &mut temp)?;
            xor_into(buf, &temp);
        }
        self.lane_write(peer, block, buf)
    }

    /// Rebuilds a repaired disk from its peer, copying on the mirrored
    /// levels and XOR-reconstructing on the parity levels. Best effort: a
    /// missing peer means there is nothing to rebuild from.
    fn restore(&self, disk: u32) -> Result<(), RaidError> {
        let (level, broken) = self.snapshot();
        let Some(level) = level else {
            return Ok(());
        };
        if !level.has_redundancy() {
            return Ok(());
        }
        let layout = self.layout(level);
        let Some(mut peer) = layout.parity_disk_of(disk, disk - 1) else {
            return Ok(());
        };
        if broken[peer as usize - 1] {
            return Ok(());
        }
        if level.uses_parity() {
            if (1..=self.disk_count).any(|d| broken[d as usize - 1]) {
                return Ok(());
            }
            if level == RaidLevel::Raid4 && disk == peer {
                peer -= 1;
            }
        }

        let watermark = lock(&self.state).disks[disk as usize - 1].watermark;
        log::debug!("rebuilding disk {disk} from disk {peer} up to block {watermark}");
        let mut buf = [0u8; BLOCK_SIZE];
        let mut temp = [0u8; BLOCK_SIZE];
        for block in 1..=watermark {
            self.lane_read(peer, block, &mut buf)?;
            if level.uses_parity() {
                for other in 1..=self.disk_count {
                    if other == disk || other == peer {
                        continue;
                    }
                    self.lane_read(other, block, &mut temp)?;
                    xor_into(&mut buf, &temp);
                }
            }
            self.lane_write(disk, block, &buf)?;
        }
        Ok(())
    }
}
