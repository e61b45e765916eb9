// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Helper functions for interacting with Linux sysfs interfaces

use std::{fs, path::Path, str::FromStr};

/// Reads a value from a sysfs node and attempts to parse it to type T
///
/// # Arguments
///
/// * `node` - Path to the sysfs device node
/// * `key` - Name of the sysfs attribute to read, may contain subdirectories (`queue/zoned`)
///
/// # Returns
///
/// * `Some(T)` if the value was successfully read and parsed
/// * `None` if the file could not be read or parsed
pub(crate) fn read<T>(node: &Path, key: &str) -> Option<T>
where
    T: FromStr,
{
    let path = node.join(key);
    match fs::read_to_string(&path) {
        Ok(raw) => raw.trim().parse().ok(),
        Err(e) => {
            log::trace!("{}: {e}", path.display());
            None
        }
    }
}

/// Whether the attribute exists at all, regardless of its content
pub(crate) fn exists(node: &Path, key: &str) -> bool {
    node.join(key).exists()
}
