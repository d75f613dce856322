//! Address arithmetic: logical block number to (disk, physical block)
//! mapping for every supported level.
//!
//! Disks and physical blocks are 1-based; physical block 0 of every disk is
//! reserved for the engine header and never mapped. All functions here are
//! pure and total over the valid logical range.

use vraid_blockdev::BLOCK_SIZE;

use crate::RaidLevel;

/// The geometry a mapping is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub level: RaidLevel,
    /// Physical disk count.
    pub disks: u32,
    /// Physical blocks per disk, including the reserved header block.
    pub blocks_per_disk: u32,
}

impl Layout {
    /// Number of disks holding caller data.
    pub fn data_disks(&self) -> u32 {
        match self.level {
            RaidLevel::Raid0 | RaidLevel::Raid5 => self.disks,
            RaidLevel::Raid4 => self.disks - 1,
            RaidLevel::Raid1 | RaidLevel::Raid01 => self.disks / 2,
        }
    }

    /// Number of logical blocks exposed to callers.
    pub fn logical_blocks(&self) -> u32 {
        let mut disks = self.data_disks();
        if self.level == RaidLevel::Raid5 {
            disks -= 1;
        }
        disks * (self.blocks_per_disk - 1)
    }

    /// The disk holding logical block `lbn`, 1-based.
    ///
    /// RAID1 places blocks contiguously with a fixed per-disk stride of
    /// `BLOCK_SIZE - 1`; the striped levels rotate across the data disks.
    pub fn disk_of(&self, lbn: u32) -> u32 {
        match self.level {
            RaidLevel::Raid1 => lbn / (BLOCK_SIZE as u32 - 1) + 1,
            _ => lbn % self.data_disks() + 1,
        }
    }

    /// The physical block holding logical block `lbn`, 1-based.
    ///
    /// For RAID5 the result skips over the rotating parity slot: each run of
    /// `disks - 1` logical blocks donates one physical block per stripe to
    /// parity, so the raw stripe index is advanced once for every full
    /// rotation and once more when it lands on or past the parity slot of
    /// its own stripe.
    pub fn block_of(&self, lbn: u32) -> u32 {
        match self.level {
            RaidLevel::Raid1 => lbn % (BLOCK_SIZE as u32 - 1) + 1,
            RaidLevel::Raid0 | RaidLevel::Raid01 | RaidLevel::Raid4 => {
                lbn / self.data_disks() + 1
            }
            RaidLevel::Raid5 => {
                let disk = self.disk_of(lbn);
                let row = lbn / self.disks;
                let parity_rows = (lbn / (self.disks - 1)) / self.disks;
                let mut block = row + parity_rows;
                if block % self.disks >= self.disks - disk {
                    block += 1;
                }
                block + 1
            }
        }
    }

    /// The disk that mirrors or holds parity for `disk` at logical block
    /// `lbn`, or `None` when the level has no redundancy.
    pub fn parity_disk_of(&self, disk: u32, lbn: u32) -> Option<u32> {
        match self.level {
            RaidLevel::Raid0 => None,
            RaidLevel::Raid1 | RaidLevel::Raid01 => {
                let half = self.disks / 2;
                Some(if disk > half { disk - half } else { disk + half })
            }
            RaidLevel::Raid4 => Some(self.disks),
            RaidLevel::Raid5 => {
                Some(self.disks - (lbn / (self.disks - 1)) % self.disks)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn layout(level: RaidLevel) -> Layout {
        Layout {
            level,
            disks: 4,
            blocks_per_disk: 64,
        }
    }

    #[test]
    fn capacities() {
        assert_eq!(layout(RaidLevel::Raid0).logical_blocks(), 4 * 63);
        assert_eq!(layout(RaidLevel::Raid1).logical_blocks(), 2 * 63);
        assert_eq!(layout(RaidLevel::Raid01).logical_blocks(), 2 * 63);
        assert_eq!(layout(RaidLevel::Raid4).logical_blocks(), 3 * 63);
        assert_eq!(layout(RaidLevel::Raid5).logical_blocks(), 3 * 63);
    }

    #[test]
    fn striped_mappings_stay_in_bounds_and_never_collide() {
        for level in [RaidLevel::Raid0, RaidLevel::Raid01, RaidLevel::Raid4, RaidLevel::Raid5] {
            let layout = layout(level);
            let mut seen = HashSet::new();
            for lbn in 0..layout.logical_blocks() {
                let disk = layout.disk_of(lbn);
                let block = layout.block_of(lbn);
                assert!((1..=layout.disks).contains(&disk), "{level} lbn {lbn}");
                assert!(
                    (1..layout.blocks_per_disk).contains(&block),
                    "{level} lbn {lbn} block {block}"
                );
                assert!(seen.insert((disk, block)), "{level} lbn {lbn} collides");
            }
        }
    }

    #[test]
    fn raid5_parity_never_shares_a_disk_with_its_data() {
        let layout = layout(RaidLevel::Raid5);
        for lbn in 0..layout.logical_blocks() {
            let disk = layout.disk_of(lbn);
            let parity = layout.parity_disk_of(disk, lbn).unwrap();
            assert_ne!(disk, parity, "lbn {lbn}");
            assert!((1..=layout.disks).contains(&parity));
        }
    }

    #[test]
    fn raid5_parity_rotates_across_stripes() {
        let layout = layout(RaidLevel::Raid5);
        let stride = layout.disks - 1;
        let mut parity_disks = HashSet::new();
        for stripe in 0..layout.disks {
            let lbn = stripe * stride;
            parity_disks.insert(layout.parity_disk_of(layout.disk_of(lbn), lbn).unwrap());
        }
        // One full rotation visits every disk once.
        assert_eq!(parity_disks.len(), layout.disks as usize);

        // And any window spanning two stripes sees the parity disk move.
        for lbn in 0..layout.logical_blocks() - stride {
            let a = layout.parity_disk_of(layout.disk_of(lbn), lbn).unwrap();
            let b = layout
                .parity_disk_of(layout.disk_of(lbn + stride), lbn + stride)
                .unwrap();
            assert_ne!(a, b, "stripe boundary after lbn {lbn}");
        }
    }

    #[test]
    fn raid5_blocks_within_a_stripe_share_their_parity_slot() {
        let layout = layout(RaidLevel::Raid5);
        let stride = layout.disks - 1;
        for stripe in 0..(layout.logical_blocks() / stride) {
            let lbns = (stripe * stride)..(stripe * stride + stride);
            let blocks: HashSet<u32> = lbns.clone().map(|l| layout.block_of(l)).collect();
            assert_eq!(blocks.len(), 1, "stripe {stripe} spans physical blocks");
            let parities: HashSet<u32> = lbns
                .map(|l| layout.parity_disk_of(layout.disk_of(l), l).unwrap())
                .collect();
            assert_eq!(parities.len(), 1, "stripe {stripe} disagrees on parity");
        }
    }

    #[test]
    fn raid4_parity_is_the_last_disk() {
        let layout = layout(RaidLevel::Raid4);
        for lbn in 0..layout.logical_blocks() {
            assert_eq!(layout.parity_disk_of(layout.disk_of(lbn), lbn), Some(4));
        }
    }

    #[test]
    fn mirrors_pair_across_halves() {
        let layout = layout(RaidLevel::Raid01);
        assert_eq!(layout.parity_disk_of(1, 0), Some(3));
        assert_eq!(layout.parity_disk_of(2, 0), Some(4));
        assert_eq!(layout.parity_disk_of(3, 0), Some(1));
        assert_eq!(layout.parity_disk_of(4, 0), Some(2));
    }

    #[test]
    fn raid1_uses_the_fixed_block_stride() {
        // The RAID1 mapping strides by BLOCK_SIZE - 1 regardless of the disk
        // geometry, so it is exercised with a matching disk size.
        let layout = Layout {
            level: RaidLevel::Raid1,
            disks: 2,
            blocks_per_disk: 1024,
        };
        assert_eq!(layout.logical_blocks(), 1023);
        for lbn in 0..layout.logical_blocks() {
            assert_eq!(layout.disk_of(lbn), 1);
            assert_eq!(layout.block_of(lbn), lbn + 1);
            assert_eq!(layout.parity_disk_of(1, lbn), Some(2));
        }

        // With more disks the stride keeps walking into the mirror half.
        let wide = Layout {
            level: RaidLevel::Raid1,
            disks: 4,
            blocks_per_disk: 1024,
        };
        assert_eq!(wide.disk_of(0), 1);
        assert_eq!(wide.disk_of(1023), 2);
        assert_eq!(wide.disk_of(2045), 2);
        assert_eq!(wide.block_of(2045), 1023);
    }

    #[test]
    fn raid0_has_no_redundancy() {
        let layout = layout(RaidLevel::Raid0);
        assert_eq!(layout.parity_disk_of(1, 0), None);
        assert_eq!(layout.parity_disk_of(4, 17), None);
    }
}
