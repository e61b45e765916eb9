// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Byte order detection for legacy and interim zone reports
//!
//! Those interfaces never say which byte order the device (or the HBA in
//! between) returned. The guess looks at the first descriptor's length: read
//! as big-endian, a real SMR zone size is one of a handful of round powers of
//! two. The guess is attached to the decode session, never stored globally.

use log::{debug, info};

use crate::format::{Endianness, Format};

/// Zone lengths, in sectors, that identify a big-endian result
pub const CANONICAL_ZONE_LENGTHS: [u64; 6] = [0x080000, 0x100000, 0x200000, 0x300000, 0x400000, 0x800000];

/// How the byte order of a report is chosen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndianPolicy {
    /// Inspect the result
    #[default]
    Detect,
    /// Caller knows better, no inspection happens
    Fixed(Endianness),
}

/// Byte order picked for one decode session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub endianness: Endianness,
    /// Inferred from the data rather than fixed by the format or the caller
    pub detected: bool,
    /// The data gave nothing to go on (empty or zeroed first descriptor)
    pub provisional: bool,
}

impl Resolution {
    pub fn fixed(endianness: Endianness) -> Self {
        Self {
            endianness,
            detected: false,
            provisional: false,
        }
    }
}

/// Pick the byte order for a freshly returned report buffer
///
/// The current interface is always host order, whatever the policy says.
pub fn resolve(format: Format, policy: EndianPolicy, buf: &[u8]) -> Resolution {
    if !format.needs_endian_detection() {
        if let EndianPolicy::Fixed(endianness) = policy {
            debug!("ignoring {endianness} byte order for the {format} interface");
        }
        return Resolution::fixed(Endianness::Native);
    }
    match policy {
        EndianPolicy::Fixed(endianness) => Resolution::fixed(endianness),
        EndianPolicy::Detect => detect(format, buf),
    }
}

/// Inspect the first descriptor's length field interpreted as big-endian.
///
/// A canonical zone size there means the result is big-endian and must be
/// swapped; anything else is left in host order.
pub fn detect(format: Format, buf: &[u8]) -> Resolution {
    let schema = format.schema();
    let first = buf.get(schema.envelope.size..).unwrap_or_default();
    let be_length = schema.descriptor.length.read(first, Endianness::Big);

    let (endianness, provisional) = match be_length {
        Some(len) if CANONICAL_ZONE_LENGTHS.contains(&len) => (Endianness::Big, false),
        Some(0) | None => (Endianness::Native, true),
        Some(_) => (Endianness::Native, false),
    };

    if provisional {
        debug!("no descriptor to inspect, assuming host order results");
    } else if endianness == Endianness::Big {
        info!("*** RESULTS are BIG ENDIAN ***");
    } else {
        info!("*** RESULTS are LITTLE ENDIAN ***");
    }

    Resolution {
        endianness,
        detected: true,
        provisional,
    }
}
