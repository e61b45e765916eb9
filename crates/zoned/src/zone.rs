// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Normalized zone records shared by every wire format

use std::fmt;

/// Type of zone in a descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneType {
    /// Conventional random write zone, no write pointer
    Conventional,
    /// Non-sequential writes are rejected
    SequentialWriteRequired,
    /// Non-sequential writes allowed but discouraged
    SequentialWritePreferred,
    /// Reserved or unknown type code
    Reserved(u8),
}

impl From<u8> for ZoneType {
    fn from(raw: u8) -> Self {
        match raw & 0x0f {
            1 => ZoneType::Conventional,
            2 => ZoneType::SequentialWriteRequired,
            3 => ZoneType::SequentialWritePreferred,
            n => ZoneType::Reserved(n),
        }
    }
}

impl ZoneType {
    /// Wire code
    pub fn code(self) -> u8 {
        match self {
            ZoneType::Conventional => 1,
            ZoneType::SequentialWriteRequired => 2,
            ZoneType::SequentialWritePreferred => 3,
            ZoneType::Reserved(n) => n,
        }
    }

    /// Whether zones of this type track a write pointer
    pub fn has_write_pointer(self) -> bool {
        matches!(
            self,
            ZoneType::SequentialWriteRequired | ZoneType::SequentialWritePreferred
        )
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneType::Conventional => f.write_str("CONVENTIONAL"),
            ZoneType::SequentialWriteRequired => f.write_str("SEQ_WRITE_REQUIRED"),
            ZoneType::SequentialWritePreferred => f.write_str("SEQ_WRITE_PREFERRED"),
            ZoneType::Reserved(_) => f.write_str("RESERVED"),
        }
    }
}

/// Condition of a zone at report time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneCondition {
    /// Conventional zone, no write pointer
    NotWritePointer,
    Empty,
    /// Opened by a write to the zone
    ImplicitOpen,
    /// Opened by an open zone command
    ExplicitOpen,
    Closed,
    ReadOnly,
    /// No remaining space in the zone
    Full,
    Offline,
    /// Codes 0x5 to 0xC
    Reserved(u8),
}

impl From<u8> for ZoneCondition {
    fn from(raw: u8) -> Self {
        match raw & 0x0f {
            0x0 => ZoneCondition::NotWritePointer,
            0x1 => ZoneCondition::Empty,
            0x2 => ZoneCondition::ImplicitOpen,
            0x3 => ZoneCondition::ExplicitOpen,
            0x4 => ZoneCondition::Closed,
            0xd => ZoneCondition::ReadOnly,
            0xe => ZoneCondition::Full,
            0xf => ZoneCondition::Offline,
            n => ZoneCondition::Reserved(n),
        }
    }
}

impl ZoneCondition {
    /// Wire code
    pub fn code(self) -> u8 {
        match self {
            ZoneCondition::NotWritePointer => 0x0,
            ZoneCondition::Empty => 0x1,
            ZoneCondition::ImplicitOpen => 0x2,
            ZoneCondition::ExplicitOpen => 0x3,
            ZoneCondition::Closed => 0x4,
            ZoneCondition::ReadOnly => 0xd,
            ZoneCondition::Full => 0xe,
            ZoneCondition::Offline => 0xf,
            ZoneCondition::Reserved(n) => n,
        }
    }

    /// Two letter code used in report listings
    pub fn short_name(self) -> &'static str {
        const RESERVED: [&str; 8] = ["x5", "x6", "x7", "x8", "x9", "xA", "xB", "xC"];
        match self {
            ZoneCondition::NotWritePointer => "cv",
            ZoneCondition::Empty => "e0",
            ZoneCondition::ImplicitOpen => "Oi",
            ZoneCondition::ExplicitOpen => "Oe",
            ZoneCondition::Closed => "Cl",
            ZoneCondition::ReadOnly => "ro",
            ZoneCondition::Full => "fu",
            ZoneCondition::Offline => "OL",
            ZoneCondition::Reserved(n) => RESERVED.get((n as usize).wrapping_sub(5)).copied().unwrap_or("x?"),
        }
    }
}

/// Report Zones "same" code describing how uniform the reported zones are
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SameCode {
    #[default]
    AllDifferent,
    AllSame,
    LastDiffers,
    SameLengthDifferentTypes,
    Reserved(u8),
}

impl From<u8> for SameCode {
    fn from(raw: u8) -> Self {
        match raw & 0x0f {
            0 => SameCode::AllDifferent,
            1 => SameCode::AllSame,
            2 => SameCode::LastDiffers,
            3 => SameCode::SameLengthDifferentTypes,
            n => SameCode::Reserved(n),
        }
    }
}

impl SameCode {
    /// Wire code
    pub fn code(self) -> u8 {
        match self {
            SameCode::AllDifferent => 0,
            SameCode::AllSame => 1,
            SameCode::LastDiffers => 2,
            SameCode::SameLengthDifferentTypes => 3,
            SameCode::Reserved(n) => n,
        }
    }
}

impl fmt::Display for SameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameCode::AllDifferent => f.write_str("all zones are different"),
            SameCode::AllSame => f.write_str("all zones are same size"),
            SameCode::LastDiffers => f.write_str("last zone differs by size"),
            SameCode::SameLengthDifferentTypes => f.write_str("all zones same size - different types"),
            SameCode::Reserved(n) => write!(f, "reserved ({n})"),
        }
    }
}

/// One zone as seen at query time. Sector values are in 512 byte units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneDescriptor {
    pub zone_type: ZoneType,
    pub condition: ZoneCondition,
    pub start_lba: u64,
    /// Zero marks the end of the valid descriptors in a buffer
    pub length_sectors: u64,
    pub write_pointer_lba: u64,
    pub reset_recommended: bool,
    pub non_sequential_resources_active: bool,
    /// Usable sectors in the zone, only reported by the current kernel interface
    pub capacity: Option<u64>,
}

impl ZoneDescriptor {
    /// An empty sequential-write-required zone
    pub fn sequential(start_lba: u64, length_sectors: u64) -> Self {
        Self {
            zone_type: ZoneType::SequentialWriteRequired,
            condition: ZoneCondition::Empty,
            start_lba,
            length_sectors,
            write_pointer_lba: start_lba,
            reset_recommended: false,
            non_sequential_resources_active: false,
            capacity: None,
        }
    }

    /// First sector past the end of the zone
    pub fn end_lba(&self) -> u64 {
        self.start_lba.saturating_add(self.length_sectors)
    }

    /// Whether the write pointer lies inside `[start, start + length]`
    pub fn is_consistent(&self) -> bool {
        (self.start_lba..=self.end_lba()).contains(&self.write_pointer_lba)
    }

    /// Sectors written so far, when the write pointer is meaningful
    pub fn write_pointer_offset(&self) -> Option<u64> {
        self.is_consistent()
            .then(|| self.write_pointer_lba - self.start_lba)
    }
}

impl fmt::Display for ZoneDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  start: {:9x}, len {:7x}, wptr {:8x} reset:{} non-seq:{}, zcond:{:2}({}) [type: {}({})]",
            self.start_lba,
            self.length_sectors,
            self.write_pointer_lba.wrapping_sub(self.start_lba),
            u8::from(self.reset_recommended),
            u8::from(self.non_sequential_resources_active),
            self.condition.code(),
            self.condition.short_name(),
            self.zone_type.code(),
            self.zone_type,
        )
    }
}
