// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use superblock::Superblock;
use zonetools::init_logging;

/// Identify a ZDM volume from its superblock
#[derive(Parser, Debug)]
#[command(name = "zdmprobe", version, about)]
struct Cli {
    /// Device or image to probe
    device: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut file = fs::File::open(&cli.device).with_context(|| format!("cannot open {}", cli.device.display()))?;
    let superblock = Superblock::from_reader(&mut file)
        .with_context(|| format!("{}: no ZDM superblock found", cli.device.display()))?;

    let Superblock::Zdm(zdm) = &superblock;
    println!("TYPE:        {}", superblock.kind());
    println!("UUID:        {}", zdm.uuid()?);
    println!("LABEL:       {}", zdm.label()?);
    println!("VERSION:     {}", zdm.version());
    println!("DISK TYPE:   {}", zdm.disk_type());
    println!("ZAC/ZBC:     {}", zdm.zac_zbc_supported());
    println!("SECTORS:     {} from {}", zdm.sector_size(), zdm.sector_start());
    println!("ZONE SIZE:   {} sectors", zdm.zone_size_sectors());
    println!("DATA START:  zone {}", zdm.data_start_zone());
    println!(
        "ZONES:       {} metadata, {} over-provisioned",
        zdm.metadata_zone_count(),
        zdm.over_provision_zone_count()
    );
    println!("BLOCKS:      {}", zdm.mapped_block_count());
    println!("DISCARD:     {}", zdm.discard_enabled());
    Ok(())
}
