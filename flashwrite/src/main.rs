// SPDX-License-Identifier: MIT

mod disk;
mod plan;
mod progress;
mod utils;
mod writer;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use flashimg::{DiskImage, FormatRegistry, SECTOR_SIZE};
use flashpart::PartitionTable;

use crate::disk::{Disk, FileDisk};
use crate::plan::build_copy_plan;
use crate::progress::{BarProgress, NullProgress, ProgressSink};
use crate::utils::{LogLevel, set_log_level};
use crate::writer::write_image_to_disk;

#[derive(Parser)]
#[command(name = "flashwrite", version, about = "Disk image writer", long_about = None)]
struct Cli {
    /// Print extra detail about each step
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print nothing but errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a disk image to a physical device
    Write {
        /// Source image (.img, .usb, .iso, .vhd)
        #[arg(short, long)]
        image: PathBuf,

        /// Target block device (e.g. /dev/sdX)
        #[arg(short, long)]
        device: PathBuf,

        /// Only print what would be written
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the partition table and copy plan of an image
    Inspect {
        /// Source image
        #[arg(short, long)]
        image: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    set_log_level(if cli.verbose {
        LogLevel::Verbose
    } else if cli.quiet {
        LogLevel::Quiet
    } else {
        LogLevel::Normal
    });

    match cli.command {
        Commands::Write {
            image,
            device,
            dry_run,
        } => {
            let img = FormatRegistry::default().open(&image)?;
            let mut disk = FileDisk::open(&device)?;
            crate::log_info!(
                "image {} ({} bytes) -> device {} ({} bytes)",
                image.display(),
                img.len(),
                device.display(),
                disk.capacity()
            );
            if dry_run {
                print_summary(&img)?;
                crate::log_info!("dry run: no data written");
                return Ok(());
            }
            let mut progress: Box<dyn ProgressSink> = if cli.quiet {
                Box::new(NullProgress)
            } else {
                Box::new(BarProgress::new("writing"))
            };
            write_image_to_disk(&mut disk, &img, &mut *progress)?;
            crate::log_info!("done, device ejected");
        }
        Commands::Inspect { image } => {
            let img = FormatRegistry::default().open(&image)?;
            crate::log_info!("image {} ({} bytes)", image.display(), img.len());
            print_summary(&img)?;
        }
    }
    Ok(())
}

fn print_summary(img: &DiskImage) -> anyhow::Result<()> {
    let Some(table) = PartitionTable::detect(img)? else {
        println!("{}", "no partition table found".yellow());
        return Ok(());
    };

    println!("scheme: {}", table.scheme_name().green().bold());
    if let PartitionTable::Gpt(gpt) = &table {
        println!("disk guid: {}", format_guid(&gpt.header().disk_guid).cyan());
        for entry in gpt.entries() {
            let name = entry.name();
            println!(
                "  {} [{} .. {}] {}",
                format_guid(&entry.type_guid).cyan(),
                entry.first_lba.get(),
                entry.last_lba.get(),
                if name.is_empty() { "-".into() } else { name }
            );
        }
    }
    for (i, part) in table.partitions().iter().enumerate() {
        println!(
            "partition {i}: offset {} length {}",
            part.offset(),
            part.length()
        );
    }

    if img.len().is_multiple_of(SECTOR_SIZE) {
        let plan = build_copy_plan(img.len(), table.partitions())?;
        let total: u64 = plan.iter().map(|e| e.length()).sum();
        println!(
            "copy plan: {} extents, {} of {} bytes",
            plan.len().to_string().bold(),
            total,
            img.len()
        );
    } else {
        println!(
            "{}",
            "image length is not sector aligned; writing would fail".red()
        );
    }
    Ok(())
}

/// Formats 16 raw GUID bytes in mixed-endian registry format.
fn format_guid(guid: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        guid[3], guid[2], guid[1], guid[0],
        guid[5], guid[4],
        guid[7], guid[6],
        guid[8], guid[9],
        guid[10], guid[11], guid[12], guid[13], guid[14], guid[15],
    )
}
