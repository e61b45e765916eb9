// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Attribute lookup for zoned block devices
//!
//! The kernel publishes the zone geometry of a block device in sysfs
//! (`queue/zoned`, `queue/chunk_sectors`, `queue/nr_zones`). Partitions do not
//! carry a `queue` directory of their own, so lookups are always resolved
//! against the whole disk.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    sync::OnceLock,
};

use regex::Regex;

pub mod mock;
mod sysfs;

const SYSFS_DIR: &str = "sys/class/block";
const DEVFS_DIR: &str = "/dev";

/// Answers geometry questions about a device path.
pub trait DeviceAttributes {
    /// Zone size in 512 byte sectors. Zero means unknown or unsupported.
    fn zone_sectors(&self, device: &Path) -> u64;
}

/// Zoned block device model as reported by `queue/zoned`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneModel {
    /// Regular, non zoned device
    None,
    /// Sequential write preferred, random writes tolerated
    HostAware,
    /// Sequential write required
    HostManaged,
}

impl FromStr for ZoneModel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ZoneModel::None),
            "host-aware" => Ok(ZoneModel::HostAware),
            "host-managed" => Ok(ZoneModel::HostManaged),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ZoneModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneModel::None => f.write_str("none"),
            ZoneModel::HostAware => f.write_str("host-aware"),
            ZoneModel::HostManaged => f.write_str("host-managed"),
        }
    }
}

/// A whole disk together with its zone geometry.
#[derive(Debug)]
pub struct ZonedDisk {
    /// Device name (e.g. sda, nvme0n1)
    pub name: String,
    /// Total number of sectors on the disk
    pub sectors: u64,
    /// Path to the device in sysfs
    pub node: PathBuf,
    /// Path to the device in /dev
    pub device: PathBuf,
    /// Zoned model
    pub zone_model: ZoneModel,
    /// Zone size in sectors, zero when not zoned
    pub zone_sectors: u64,
    /// Number of zones if the kernel reports it
    pub nr_zones: Option<u64>,
    /// Optional disk model name
    pub model: Option<String>,
    /// Optional disk vendor name
    pub vendor: Option<String>,
}

impl fmt::Display for ZonedDisk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let gib = self.sectors as f64 * 512.0 / 1_073_741_824.0;
        write!(f, "{} ({:.2} GiB, {})", self.name, gib, self.zone_model)?;

        if self.zone_sectors != 0 {
            write!(f, " zone {} sectors", self.zone_sectors)?;
        }
        if let Some(vendor) = &self.vendor {
            write!(f, " - {}", vendor)?;
        }
        if let Some(model) = &self.model {
            write!(f, " {}", model)?;
        }

        Ok(())
    }
}

impl ZonedDisk {
    /// True for host-aware and host-managed disks
    pub fn is_zoned(&self) -> bool {
        self.zone_model != ZoneModel::None
    }
}

/// Trait for initializing disk devices from sysfs.
pub trait DiskInit: Sized {
    /// Creates a new disk instance by reading information from the specified sysfs path.
    ///
    /// # Arguments
    ///
    /// * `root` - The sysfs block class directory
    /// * `name` - The name of the disk device
    ///
    /// # Returns
    ///
    /// `Some(Self)` if the disk was successfully initialized, `None` otherwise
    fn from_sysfs_path(root: &Path, name: &str) -> Option<Self>;
}

impl DiskInit for ZonedDisk {
    fn from_sysfs_path(root: &Path, name: &str) -> Option<Self> {
        let node = root.join(name);
        if !node.exists() {
            return None;
        }
        Some(Self {
            name: name.to_owned(),
            sectors: sysfs::read(&node, "size").unwrap_or(0),
            device: PathBuf::from(DEVFS_DIR).join(name),
            zone_model: sysfs::read(&node, "queue/zoned").unwrap_or(ZoneModel::None),
            zone_sectors: sysfs::read(&node, "queue/chunk_sectors").unwrap_or(0),
            nr_zones: sysfs::read(&node, "queue/nr_zones"),
            model: sysfs::read(&node, "device/model"),
            vendor: sysfs::read(&node, "device/vendor"),
            node,
        })
    }
}

/// Attribute lookup backed by a sysfs tree.
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Sysfs {
    /// Lookups relative to `sysroot`, normally `/`
    pub fn new(sysroot: impl AsRef<Path>) -> Self {
        Self {
            root: sysroot.as_ref().to_path_buf(),
        }
    }

    fn block_dir(&self) -> PathBuf {
        self.root.join(SYSFS_DIR)
    }

    /// Maps a partition name onto its whole disk (`sda3` -> `sda`, `nvme0n1p2` -> `nvme0n1`).
    /// Names that are not partitions are returned unchanged.
    pub fn whole_disk_name(&self, name: &str) -> String {
        if !sysfs::exists(&self.block_dir().join(name), "partition") {
            return name.to_owned();
        }

        static PARTITION: OnceLock<Regex> = OnceLock::new();
        let pattern = PARTITION.get_or_init(|| {
            Regex::new(r"^(?P<disk>(?:nvme\d+n\d+|mmcblk\d+|loop\d+|nbd\d+))p\d+$|^(?P<plain>[a-z]+)\d+$")
                .expect("static regex")
        });

        pattern
            .captures(name)
            .and_then(|c| c.name("disk").or_else(|| c.name("plain")))
            .map(|m| m.as_str().to_owned())
            .unwrap_or_else(|| name.to_owned())
    }

    /// Looks up the whole disk behind a device path such as `/dev/sdb2`
    pub fn disk_for(&self, device: &Path) -> Option<ZonedDisk> {
        // Follow /dev/disk/by-* style symlinks to the kernel name
        let device = fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf());
        let name = device.file_name()?.to_str()?;
        let disk = self.whole_disk_name(name);
        log::debug!("{} resolved to disk {disk}", device.display());
        ZonedDisk::from_sysfs_path(&self.block_dir(), &disk)
    }

    /// Discovers all zoned disks in the sysfs tree
    pub fn discover(&self) -> io::Result<Vec<ZonedDisk>> {
        let block_dir = self.block_dir();
        let mut disks = fs::read_dir(&block_dir)?
            .filter_map(Result::ok)
            .filter_map(|e| Some(e.file_name().to_str()?.to_owned()))
            .filter(|name| !sysfs::exists(&block_dir.join(name), "partition"))
            .filter_map(|name| ZonedDisk::from_sysfs_path(&block_dir, &name))
            .filter(ZonedDisk::is_zoned)
            .collect::<Vec<_>>();
        disks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(disks)
    }
}

impl DeviceAttributes for Sysfs {
    fn zone_sectors(&self, device: &Path) -> u64 {
        self.disk_for(device).map(|d| d.zone_sectors).unwrap_or(0)
    }
}
