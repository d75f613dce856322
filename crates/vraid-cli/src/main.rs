use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use vraid::{RaidArray, RaidError, RaidLevel};
use vraid_blockdev::{BLOCK_SIZE, FileDisk};

#[derive(Debug, Parser)]
#[command(name = "vraid", about = "Operate a RAID array backed by disk image files")]
struct Args {
    /// Directory holding the disk images (disk1.img, disk2.img, ...)
    dir: PathBuf,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Create a directory of blank disk images
    Create {
        /// Number of disks
        #[arg(long)]
        disks: u32,
        /// Blocks per disk, including the reserved header block
        #[arg(long)]
        blocks: u32,
    },
    /// Configure the array (raid0, raid1, raid01, raid4, raid5)
    Init { level: RaidLevel },
    /// Print the array geometry
    Info,
    /// Read one logical block to stdout or a file
    Read {
        lbn: u32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write one logical block from a file (must hold a full block)
    Write { lbn: u32, input: PathBuf },
    /// Mark a disk broken
    Fail { disk: u32 },
    /// Repair a disk and rebuild its contents
    Repair { disk: u32 },
    /// Unconfigure the array
    Destroy,
}

fn main() {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(if args.verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .init()
        .unwrap();

    if let Err(err) = run(args) {
        eprintln!("error: {err:#}");
        let code = err
            .downcast_ref::<RaidError>()
            .map_or(1, |e| e.code().unsigned_abs() as i32);
        std::process::exit(code);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if let Command::Create { disks, blocks } = args.cmd {
        return create_images(&args.dir, disks, blocks);
    }

    let array = open_array(&args.dir)?;
    match args.cmd {
        Command::Create { .. } => unreachable!("handled above"),
        Command::Init { level } => {
            array.initialize(level)?;
            println!("configured {level}");
        }
        Command::Info => {
            let info = array.info()?;
            println!("blocks: {}", info.logical_blocks);
            println!("block size: {}", info.block_size);
            println!("disks: {}", info.data_disks);
        }
        Command::Read { lbn, output } => {
            let mut block = [0u8; BLOCK_SIZE];
            array.read(lbn, &mut block)?;
            match output {
                Some(path) => fs::write(&path, block)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout().write_all(&block)?,
            }
        }
        Command::Write { lbn, input } => {
            let mut block = [0u8; BLOCK_SIZE];
            fs::File::open(&input)
                .and_then(|mut f| f.read_exact(&mut block))
                .with_context(|| format!("reading {}", input.display()))?;
            array.write(lbn, &block)?;
        }
        Command::Fail { disk } => {
            array.fail_disk(disk)?;
            println!("disk {disk} marked broken");
        }
        Command::Repair { disk } => {
            array.repair_disk(disk)?;
            println!("disk {disk} repaired");
        }
        Command::Destroy => {
            array.destroy()?;
            println!("array destroyed");
        }
    }
    Ok(())
}

fn image_path(dir: &Path, disk: u32) -> PathBuf {
    dir.join(format!("disk{disk}.img"))
}

fn create_images(dir: &Path, disks: u32, blocks: u32) -> anyhow::Result<()> {
    anyhow::ensure!(disks >= 1, "at least one disk is required");
    anyhow::ensure!(blocks >= 2, "disks need at least two blocks");
    fs::create_dir_all(dir)?;
    for disk in 1..=disks {
        let path = image_path(dir, disk);
        FileDisk::create(&path, blocks)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    println!("created {disks} disks of {blocks} blocks in {}", dir.display());
    Ok(())
}

fn open_array(dir: &Path) -> anyhow::Result<RaidArray<FileDisk>> {
    let mut disks = Vec::new();
    loop {
        let path = image_path(dir, disks.len() as u32 + 1);
        if !path.exists() {
            break;
        }
        disks.push(
            FileDisk::open(&path).with_context(|| format!("opening {}", path.display()))?,
        );
    }
    anyhow::ensure!(
        !disks.is_empty(),
        "no disk images found in {} (run create first)",
        dir.display()
    );
    log::debug!("opened {} disk images", disks.len());
    Ok(RaidArray::new(disks)?)
}
