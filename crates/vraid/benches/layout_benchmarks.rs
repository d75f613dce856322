use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vraid::RaidLevel;
use vraid::layout::Layout;

fn bench_mappings(c: &mut Criterion) {
    for level in [RaidLevel::Raid0, RaidLevel::Raid4, RaidLevel::Raid5] {
        let layout = Layout {
            level,
            disks: 8,
            blocks_per_disk: 1 << 12,
        };
        c.bench_function(&format!("map_full_address_space_{level}"), |b| {
            b.iter(|| {
                let mut acc = 0u64;
                for lbn in 0..layout.logical_blocks() {
                    let disk = layout.disk_of(lbn);
                    let block = layout.block_of(lbn);
                    let parity = layout.parity_disk_of(disk, lbn).map_or(0, u64::from);
                    acc += u64::from(disk) + u64::from(block) + parity;
                }
                black_box(acc)
            })
        });
    }
}

criterion_group!(benches, bench_mappings);
criterion_main!(benches);
