// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use disks::Sysfs;
use zoned::{act, BlockDevice, ZoneAction, ZoneActionRequest};
use zonetools::{init_logging, parse_number, FormatArg};

/// Open, close, finish or reset a zone
#[derive(Parser, Debug)]
#[command(name = "blkzonecmd", version, about)]
struct Cli {
    /// Block device holding the zone
    device: PathBuf,

    /// Start sector of the zone
    #[arg(short, long, default_value = "0", value_parser = parse_number)]
    zone: u64,

    #[command(flatten)]
    action: ActionArgs,

    /// Apply to every zone of the device
    #[arg(long)]
    all: bool,

    /// Force unit access (legacy and interim only)
    #[arg(long)]
    fua: bool,

    /// Interface generation
    #[arg(long, value_enum, default_value_t)]
    format: FormatArg,

    /// Root of the sysfs tree used for the zone size lookup
    #[arg(long, default_value = "/", hide = true)]
    sysroot: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ActionArgs {
    /// Explicitly open the zone
    #[arg(long)]
    open: bool,

    /// Close the zone
    #[arg(long)]
    close: bool,

    /// Move the write pointer to the end of the zone
    #[arg(long)]
    finish: bool,

    /// Reset the write pointer of the zone
    #[arg(long)]
    reset: bool,
}

impl ActionArgs {
    fn action(&self) -> ZoneAction {
        if self.open {
            ZoneAction::Open
        } else if self.close {
            ZoneAction::Close
        } else if self.finish {
            ZoneAction::Finish
        } else {
            ZoneAction::Reset
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let action = cli.action.action();
    let request = ZoneActionRequest {
        action,
        target_lba: cli.zone,
        apply_to_all_zones: cli.all,
        force_unit_access: cli.fua,
    };

    let mut device = BlockDevice::open(&cli.device).with_context(|| format!("cannot open {}", cli.device.display()))?;
    let geometry = device.geometry(&Sysfs::new(&cli.sysroot))?;

    act(&mut device, cli.format.into(), &request, &geometry)
        .with_context(|| format!("{}: {action} zone failed", cli.device.display()))?;
    Ok(())
}
