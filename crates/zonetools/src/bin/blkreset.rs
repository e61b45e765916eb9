// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use disks::Sysfs;
use zoned::{reset_range, BlockDevice, ResetRange};
use zonetools::{init_logging, parse_number};

/// Reset the write pointer of a run of zones
#[derive(Parser, Debug)]
#[command(name = "blkreset", version, about)]
struct Cli {
    /// Block device to reset zones on
    device: PathBuf,

    /// First sector, must be zone aligned
    #[arg(short, long, default_value = "0", value_parser = parse_number)]
    zone: u64,

    /// Number of zones to reset
    #[arg(short, long, default_value = "1", value_parser = parse_number)]
    count: u64,

    /// Root of the sysfs tree used for the zone size lookup
    #[arg(long, default_value = "/", hide = true)]
    sysroot: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut device = BlockDevice::open(&cli.device).with_context(|| format!("cannot open {}", cli.device.display()))?;
    let geometry = device.geometry(&Sysfs::new(&cli.sysroot))?;

    let range = reset_range(&mut device, &ResetRange::new(cli.zone, cli.count), &geometry)
        .with_context(|| format!("{}: reset of {} zones from {} failed", cli.device.display(), cli.count, cli.zone))?;

    log::info!(
        "{}: reset sectors {:#x}..{:#x}",
        cli.device.display(),
        range.sector,
        range.sector + range.nr_sectors
    );
    Ok(())
}
