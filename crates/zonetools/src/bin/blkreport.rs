// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use zoned::{report, report::clamp_report_length, BlockDevice, ReportFilter, ReportRequest, SECTOR_SIZE};
use zonetools::{init_logging, parse_number, EndianArg, FormatArg};

/// Report the zones of a zoned block device
#[derive(Parser, Debug)]
#[command(name = "blkreport", version, about)]
struct Cli {
    /// Block device to query
    device: PathBuf,

    /// Sector to report from
    #[arg(short, long, default_value = "0", value_parser = parse_number)]
    zone: u64,

    /// Result buffer size in bytes (512 bytes to 512 KiB)
    #[arg(short, long, default_value = "0x80000", value_parser = parse_number)]
    length: u64,

    /// Report option: 0 all, 1 empty, 2 open implicit, 3 open explicit, 4 closed,
    /// 5 full, 6 read only, 7 offline, 0x10 reset, 0x11 non sequential,
    /// 0x3f non write pointer zones
    #[arg(short = 'r', long = "option", default_value = "0", value_parser = parse_number)]
    option: u64,

    /// Use ATA pass-through to work around firmware in old SAS HBAs (legacy only)
    #[arg(short, long)]
    ata: bool,

    /// Request a partial report (interim only)
    #[arg(long)]
    partial: bool,

    /// Force unit access (interim only)
    #[arg(long)]
    fua: bool,

    /// Interface generation
    #[arg(long, value_enum, default_value_t)]
    format: FormatArg,

    /// Byte order of the results
    #[arg(long, value_enum, default_value_t)]
    endian: EndianArg,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let filter = ReportFilter::try_from(cli.option)
        .with_context(|| format!("{}: invalid report option for device", cli.device.display()))?;

    let mut device = BlockDevice::open(&cli.device).with_context(|| format!("cannot open {}", cli.device.display()))?;
    let capacity = device.size_bytes()? / SECTOR_SIZE;
    if cli.zone > capacity {
        bail!("{}: offset is greater than device size", cli.device.display());
    }

    let request = ReportRequest::new(cli.format.into(), cli.zone)
        .with_length(clamp_report_length(cli.length))
        .with_filter(filter)
        .with_ata_passthrough(cli.ata)
        .with_partial(cli.partial)
        .with_force_unit_access(cli.fua)
        .with_endianness(cli.endian.into());

    let report = report(&mut device, &request).with_context(|| format!("{}: report zones failed", cli.device.display()))?;

    println!(
        "  count: {}, same {} ({}), max_lba {}",
        report.descriptor_count,
        report.same_code.code(),
        report.same_code,
        report.maximum_lba
    );
    if let Some(truncation) = report.truncation {
        println!(
            "Truncating report to {} of {} zones.",
            truncation.capacity, truncation.declared
        );
    }
    for zone in &report {
        println!("{zone}");
    }

    Ok(())
}
