// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Shared plumbing for the zone command line tools

use std::num::ParseIntError;

use clap::ValueEnum;
use log::LevelFilter;
use zoned::{EndianPolicy, Endianness, Format};

/// Configure `pretty_env_logger` from a `-v` count. `RUST_LOG` still wins.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

/// Parse decimal, `0x` hexadecimal or `0o` octal numbers
pub fn parse_number(s: &str) -> Result<u64, ParseIntError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(octal) = s.strip_prefix("0o") {
        u64::from_str_radix(octal, 8)
    } else {
        s.parse()
    }
}

/// Interface generation as a command line value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Legacy,
    Interim,
    #[default]
    Current,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Legacy => Format::Legacy,
            FormatArg::Interim => Format::Interim,
            FormatArg::Current => Format::Current,
        }
    }
}

/// Byte order policy as a command line value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EndianArg {
    /// Guess from the first descriptor
    #[default]
    Auto,
    Big,
    Little,
    Native,
}

impl From<EndianArg> for EndianPolicy {
    fn from(arg: EndianArg) -> Self {
        match arg {
            EndianArg::Auto => EndianPolicy::Detect,
            EndianArg::Big => EndianPolicy::Fixed(Endianness::Big),
            EndianArg::Little => EndianPolicy::Fixed(Endianness::Little),
            EndianArg::Native => EndianPolicy::Fixed(Endianness::Native),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("4096"), Ok(4096));
        assert_eq!(parse_number("0x80000"), Ok(0x80000));
        assert_eq!(parse_number("0o17"), Ok(15));
        assert!(parse_number("0xzz").is_err());
        assert!(parse_number("-1").is_err());
    }

    #[test]
    fn test_value_mapping() {
        assert_eq!(Format::from(FormatArg::default()), Format::Current);
        assert_eq!(EndianPolicy::from(EndianArg::Auto), EndianPolicy::Detect);
        assert_eq!(
            EndianPolicy::from(EndianArg::Big),
            EndianPolicy::Fixed(Endianness::Big)
        );
    }
}
