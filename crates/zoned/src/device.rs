// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Block device handle issuing the zone ioctls

use std::{
    fs::{File, OpenOptions},
    os::{
        fd::AsRawFd,
        unix::fs::FileTypeExt,
    },
    path::{Path, PathBuf},
};

use disks::DeviceAttributes;
use linux_raw_sys::ioctl::{BLKGETSIZE64, BLKSSZGET};
use log::{debug, trace};
use nix::{
    errno::Errno,
    libc, request_code_none, request_code_readwrite, request_code_write,
};

use crate::{
    action::{Geometry, ZoneAction, ZoneCommand},
    format::{Format, RANGE_SIZE},
    Error, Operation, SECTOR_SIZE,
};

const BLK_IOC: u8 = 0x12;

/// Both older interfaces share the report number, only the argument size differs
const LEGACY_REPORT: libc::c_ulong = request_code_readwrite!(BLK_IOC, 130, 64) as _;
const LEGACY_OPEN: libc::c_ulong = request_code_none!(BLK_IOC, 131) as _;
const LEGACY_CLOSE: libc::c_ulong = request_code_none!(BLK_IOC, 132) as _;
const LEGACY_RESET: libc::c_ulong = request_code_none!(BLK_IOC, 133) as _;

const BLKREPORTZONE: libc::c_ulong = request_code_readwrite!(BLK_IOC, 130, RANGE_SIZE) as _;
const BLKRESETZONE: libc::c_ulong = request_code_write!(BLK_IOC, 131, RANGE_SIZE) as _;
const BLKOPENZONE: libc::c_ulong = request_code_write!(BLK_IOC, 134, RANGE_SIZE) as _;
const BLKCLOSEZONE: libc::c_ulong = request_code_write!(BLK_IOC, 135, RANGE_SIZE) as _;
const BLKFINISHZONE: libc::c_ulong = request_code_write!(BLK_IOC, 136, RANGE_SIZE) as _;

/// The seam between the zone logic and the kernel
pub trait DeviceControl {
    /// Issue a report zones call. `buffer` carries the encoded request in and the
    /// raw result out.
    fn report_zones(&mut self, format: Format, buffer: &mut [u8]) -> nix::Result<()>;

    /// Issue one zone management call
    fn zone_command(&mut self, command: &ZoneCommand) -> nix::Result<()>;
}

/// An opened zoned block device
#[derive(Debug)]
pub struct BlockDevice {
    file: File,
    path: PathBuf,
}

impl BlockDevice {
    /// Open `path` read-write, refusing anything that is not a block device
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if !file.metadata()?.file_type().is_block_device() {
            return Err(Error::NotBlockDevice(path.to_owned()));
        }
        debug!("opened {}", path.display());
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device size in bytes
    pub fn size_bytes(&self) -> Result<u64, Error> {
        let mut size: u64 = 0;
        let res = unsafe { libc::ioctl(self.file.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
        Errno::result(res).map_err(|errno| Error::device(Operation::Capacity, errno))?;
        Ok(size)
    }

    /// Logical block size in bytes
    pub fn logical_block_size(&self) -> Result<u64, Error> {
        let mut size: libc::c_int = 0;
        let res = unsafe { libc::ioctl(self.file.as_raw_fd(), BLKSSZGET as _, &mut size) };
        Errno::result(res).map_err(|errno| Error::device(Operation::BlockSize, errno))?;
        Ok(size as u64)
    }

    /// Capacity, block size and zone size of the device
    pub fn geometry(&self, attributes: &impl DeviceAttributes) -> Result<Geometry, Error> {
        let geometry = geometry_of(&self.path, self.size_bytes()?, self.logical_block_size()?, attributes);
        debug!("{}: {geometry:?}", self.path.display());
        Ok(geometry)
    }
}

fn geometry_of(path: &Path, size_bytes: u64, logical_block_size: u64, attributes: &impl DeviceAttributes) -> Geometry {
    Geometry {
        capacity_sectors: size_bytes / SECTOR_SIZE,
        logical_block_size,
        zone_sectors: attributes.zone_sectors(path),
    }
}

impl DeviceControl for BlockDevice {
    fn report_zones(&mut self, format: Format, buffer: &mut [u8]) -> nix::Result<()> {
        let code = match format {
            Format::Legacy | Format::Interim => LEGACY_REPORT,
            Format::Current => BLKREPORTZONE,
        };
        trace!("report zones ioctl {code:#x}, {} bytes", buffer.len());
        let res = unsafe { libc::ioctl(self.file.as_raw_fd(), code as _, buffer.as_mut_ptr()) };
        Errno::result(res).map(drop)
    }

    fn zone_command(&mut self, command: &ZoneCommand) -> nix::Result<()> {
        let fd = self.file.as_raw_fd();
        let res = match *command {
            ZoneCommand::Value { action, argument } => {
                let code = match action {
                    ZoneAction::Open => LEGACY_OPEN,
                    ZoneAction::Close => LEGACY_CLOSE,
                    ZoneAction::Reset => LEGACY_RESET,
                    ZoneAction::Finish => return Err(Errno::EOPNOTSUPP),
                };
                trace!("zone ioctl {code:#x} argument {argument:#x}");
                unsafe { libc::ioctl(fd, code as _, argument as libc::c_ulong) }
            }
            ZoneCommand::Range { action, range } => {
                let code = match action {
                    ZoneAction::Open => BLKOPENZONE,
                    ZoneAction::Close => BLKCLOSEZONE,
                    ZoneAction::Finish => BLKFINISHZONE,
                    ZoneAction::Reset => BLKRESETZONE,
                };
                let raw = range.to_bytes();
                trace!("zone ioctl {code:#x} range {range:?}");
                unsafe { libc::ioctl(fd, code as _, raw.as_ptr()) }
            }
        };
        Errno::result(res).map(drop)
    }
}
