// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mock attribute lookup for testing.
//!
//! This module provides a fixed-answer [`DeviceAttributes`] implementation that
//! can be used to exercise zone geometry handling without a zoned disk.

use std::path::Path;

use crate::DeviceAttributes;

/// Reports the same zone size for every device.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockAttributes {
    pub zone_sectors: u64,
}

impl MockAttributes {
    /// Creates a lookup answering `zone_sectors` for any path
    pub fn new(zone_sectors: u64) -> Self {
        Self { zone_sectors }
    }

    /// A lookup for a device whose zone size cannot be determined
    pub fn unknown() -> Self {
        Self::default()
    }
}

impl DeviceAttributes for MockAttributes {
    fn zone_sectors(&self, _device: &Path) -> u64 {
        self.zone_sectors
    }
}
