// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Zone reporting and zone management for zoned block devices
//!
//! Reports are decoded from the raw bytes returned by the block layer into
//! [`ZoneDescriptor`]s, whichever generation of the interface produced them.
//! Zone actions (open, close, finish, reset) are validated up front and issued
//! as exactly one device call.

use std::{fmt, io, path::PathBuf};

use nix::errno::Errno;
use thiserror::Error;

pub mod action;
pub mod device;
pub mod endian;
pub mod format;
pub mod mock;
pub mod report;
pub mod zone;

pub use action::{act, reset_range, Geometry, ResetRange, ZoneAction, ZoneActionRequest, ZoneCommand};
pub use device::{BlockDevice, DeviceControl};
pub use endian::{EndianPolicy, Resolution};
pub use format::{Endianness, Format, ZoneRange};
pub use report::{report, ReportFilter, ReportRequest, Truncation, ZoneReport};
pub use zone::{SameCode, ZoneCondition, ZoneDescriptor, ZoneType};

/// Sector unit used by every LBA in this crate
pub const SECTOR_SIZE: u64 = 512;

/// Which device call failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Report,
    Action(ZoneAction),
    Capacity,
    BlockSize,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Report => f.write_str("report zones"),
            Operation::Action(action) => write!(f, "{action} zone"),
            Operation::Capacity => f.write_str("device size"),
            Operation::BlockSize => f.write_str("logical block size"),
        }
    }
}

/// Errors that can occur while reporting or managing zones
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before touching the device
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The device refused or failed the call
    #[error("device query failed: {operation}: {errno}")]
    Device { operation: Operation, errno: Errno },

    #[error("{}: not a block device", .0.display())]
    NotBlockDevice(PathBuf),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn device(operation: Operation, errno: Errno) -> Self {
        log::error!("{operation} failed: {errno}");
        Error::Device { operation, errno }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_device(&self) -> bool {
        matches!(self, Error::Device { .. })
    }

    /// Underlying OS error code of a device failure
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Device { errno, .. } => Some(*errno as i32),
            Error::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

/// Malformed or out of policy requests
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid report option {0:#x}")]
    InvalidReportFilter(u64),

    #[error("report length {0} must be a multiple of 512 between 512 and 524288 bytes")]
    ReportLength(usize),

    #[error("lba {lba} is not aligned to {alignment} sectors")]
    Misaligned { lba: u64, alignment: u64 },

    #[error("all zones requested together with lba {0}")]
    AllZonesWithTarget(u64),

    #[error("lba {lba} is beyond the end of the device ({capacity} sectors)")]
    BeyondDevice { lba: u64, capacity: u64 },

    #[error("unable to determine zone size")]
    UnknownZoneSize,

    #[error("unable to determine device capacity")]
    UnknownCapacity,

    #[error("zone count must be at least one")]
    NoZones,

    #[error("{feature} is not supported by the {format} interface")]
    Unsupported { feature: &'static str, format: Format },
}
