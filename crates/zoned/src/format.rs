// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Byte-exact layouts of the zone reporting interfaces
//!
//! Three generations of the block layer zone API have existed:
//!
//! - **Legacy**: the first vendor `BLKREPORT` interface. Results carry SCSI
//!   style big-endian integers, the descriptor flags byte packs the reset bit,
//!   the non-sequential bit and the zone condition.
//! - **Interim**: the ZBC/ZAC revision of the same ABI. Identical responses, but
//!   the request grows a force-unit-access byte and the report option high bit
//!   turns into the "partial" flag.
//! - **Current**: upstream `BLKREPORTZONE`. Everything is host order and every
//!   descriptor field has its own slot.
//!
//! Layouts are tables of `(offset, width)` pairs rather than `#[repr(C)]`
//! overlays; the byte order is supplied at read time so one table serves both
//! endiannesses.

use std::{fmt, str::FromStr};

use zerocopy::byteorder::{BigEndian, LittleEndian, NativeEndian, U32, U64};
use zerocopy::{FromBytes, IntoBytes};

use crate::zone::{SameCode, ZoneCondition, ZoneDescriptor, ZoneType};

/// Report option bit requesting ATA pass-through (legacy) or a partial report (interim)
pub const REPORT_OPTION_MODIFIER: u8 = 0x80;

/// `flags` bit of a current format report: descriptors carry a valid capacity
pub const REPORT_FLAG_CAPACITY: u32 = 0x1;

/// Size of a `{sector, nr_sectors}` zone range request
pub const RANGE_SIZE: usize = 16;

/// Interface generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Format {
    Legacy,
    Interim,
    #[default]
    Current,
}

impl Format {
    /// Wire layout of this generation
    pub fn schema(self) -> &'static Schema {
        match self {
            Format::Legacy => &LEGACY,
            Format::Interim => &INTERIM,
            Format::Current => &CURRENT,
        }
    }

    /// Whether results may arrive in either byte order
    pub fn needs_endian_detection(self) -> bool {
        !matches!(self, Format::Current)
    }

    /// Number of descriptors a buffer of `len` bytes can hold
    pub fn descriptor_capacity(self, len: usize) -> usize {
        let schema = self.schema();
        len.saturating_sub(schema.envelope.size) / schema.descriptor.size
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Legacy => f.write_str("legacy"),
            Format::Interim => f.write_str("interim"),
            Format::Current => f.write_str("current"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Format::Legacy),
            "interim" => Ok(Format::Interim),
            "current" => Ok(Format::Current),
            _ => Err(format!("unknown interface format: {s}")),
        }
    }
}

/// Byte order of multi-byte integers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
    /// Whatever the host uses, no swapping
    Native,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Big => f.write_str("big"),
            Endianness::Little => f.write_str("little"),
            Endianness::Native => f.write_str("native"),
        }
    }
}

impl FromStr for Endianness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "big" => Ok(Endianness::Big),
            "little" => Ok(Endianness::Little),
            "native" => Ok(Endianness::Native),
            _ => Err(format!("unknown byte order: {s}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    U8,
    U32,
    U64,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U32 => 4,
            Width::U64 => 8,
        }
    }
}

/// A single integer at a fixed offset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub width: Width,
}

impl Field {
    pub const fn new(offset: usize, width: Width) -> Self {
        Self { offset, width }
    }

    /// Extract the field, `None` if it does not fit inside `buf`
    pub fn read(&self, buf: &[u8], order: Endianness) -> Option<u64> {
        let bytes = buf.get(self.offset..self.offset + self.width.bytes())?;
        let value = match (self.width, order) {
            (Width::U8, _) => bytes[0] as u64,
            (Width::U32, Endianness::Big) => U32::<BigEndian>::read_from_bytes(bytes).ok()?.get() as u64,
            (Width::U32, Endianness::Little) => U32::<LittleEndian>::read_from_bytes(bytes).ok()?.get() as u64,
            (Width::U32, Endianness::Native) => U32::<NativeEndian>::read_from_bytes(bytes).ok()?.get() as u64,
            (Width::U64, Endianness::Big) => U64::<BigEndian>::read_from_bytes(bytes).ok()?.get(),
            (Width::U64, Endianness::Little) => U64::<LittleEndian>::read_from_bytes(bytes).ok()?.get(),
            (Width::U64, Endianness::Native) => U64::<NativeEndian>::read_from_bytes(bytes).ok()?.get(),
        };
        Some(value)
    }

    /// Store `value` truncated to the field width. Returns `false` if the field does not fit.
    pub fn write(&self, buf: &mut [u8], order: Endianness, value: u64) -> bool {
        let Some(dst) = buf.get_mut(self.offset..self.offset + self.width.bytes()) else {
            return false;
        };
        match (self.width, order) {
            (Width::U8, _) => dst[0] = value as u8,
            (Width::U32, Endianness::Big) => dst.copy_from_slice(U32::<BigEndian>::new(value as u32).as_bytes()),
            (Width::U32, Endianness::Little) => dst.copy_from_slice(U32::<LittleEndian>::new(value as u32).as_bytes()),
            (Width::U32, Endianness::Native) => dst.copy_from_slice(U32::<NativeEndian>::new(value as u32).as_bytes()),
            (Width::U64, Endianness::Big) => dst.copy_from_slice(U64::<BigEndian>::new(value).as_bytes()),
            (Width::U64, Endianness::Little) => dst.copy_from_slice(U64::<LittleEndian>::new(value).as_bytes()),
            (Width::U64, Endianness::Native) => dst.copy_from_slice(U64::<NativeEndian>::new(value).as_bytes()),
        }
        true
    }
}

/// Report header preceding the descriptors
#[derive(Debug)]
pub struct EnvelopeLayout {
    pub size: usize,
    pub descriptor_count: Field,
    pub same_field: Option<Field>,
    pub maximum_lba: Option<Field>,
    /// Bits of `maximum_lba` that carry the value
    pub maximum_lba_mask: u64,
    pub flags: Option<Field>,
}

/// Where a descriptor keeps its condition and attribute bits
#[derive(Debug)]
pub enum StateLayout {
    /// bit 0 reset, bit 1 non-seq, bits 4-7 condition
    Packed { flags: Field },
    /// One byte each
    Flat {
        condition: Field,
        non_seq: Field,
        reset: Field,
    },
}

#[derive(Debug)]
pub struct DescriptorLayout {
    pub size: usize,
    pub zone_type: Field,
    pub state: StateLayout,
    pub length: Field,
    pub start: Field,
    pub write_pointer: Field,
    pub capacity: Option<Field>,
}

/// What the request's capacity field counts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityUnit {
    /// Size of the whole result buffer in bytes
    Bytes,
    /// Number of descriptors that fit after the header
    Zones,
}

/// Report request written at the start of the result buffer, always host order
#[derive(Debug)]
pub struct RequestLayout {
    pub start_lba: Field,
    pub capacity: Field,
    pub capacity_unit: CapacityUnit,
    pub option: Option<Field>,
    pub force_unit_access: Option<Field>,
}

#[derive(Debug)]
pub struct Schema {
    pub envelope: EnvelopeLayout,
    pub descriptor: DescriptorLayout,
    pub request: RequestLayout,
}

const LEGACY_ENVELOPE: EnvelopeLayout = EnvelopeLayout {
    size: 64,
    descriptor_count: Field::new(0, Width::U32),
    same_field: Some(Field::new(4, Width::U8)),
    maximum_lba: Some(Field::new(8, Width::U64)),
    maximum_lba_mask: u64::MAX >> 16,
    flags: None,
};

const LEGACY_DESCRIPTOR: DescriptorLayout = DescriptorLayout {
    size: 64,
    zone_type: Field::new(0, Width::U8),
    state: StateLayout::Packed {
        flags: Field::new(1, Width::U8),
    },
    length: Field::new(8, Width::U64),
    start: Field::new(16, Width::U64),
    write_pointer: Field::new(24, Width::U64),
    capacity: None,
};

static LEGACY: Schema = Schema {
    envelope: LEGACY_ENVELOPE,
    descriptor: LEGACY_DESCRIPTOR,
    request: RequestLayout {
        start_lba: Field::new(0, Width::U64),
        capacity: Field::new(8, Width::U32),
        capacity_unit: CapacityUnit::Bytes,
        option: Some(Field::new(12, Width::U8)),
        force_unit_access: None,
    },
};

static INTERIM: Schema = Schema {
    envelope: LEGACY_ENVELOPE,
    descriptor: LEGACY_DESCRIPTOR,
    request: RequestLayout {
        start_lba: Field::new(0, Width::U64),
        capacity: Field::new(8, Width::U32),
        capacity_unit: CapacityUnit::Bytes,
        option: Some(Field::new(12, Width::U8)),
        force_unit_access: Some(Field::new(13, Width::U8)),
    },
};

static CURRENT: Schema = Schema {
    envelope: EnvelopeLayout {
        size: 16,
        descriptor_count: Field::new(8, Width::U32),
        same_field: None,
        maximum_lba: None,
        maximum_lba_mask: u64::MAX,
        flags: Some(Field::new(12, Width::U32)),
    },
    descriptor: DescriptorLayout {
        size: 64,
        zone_type: Field::new(24, Width::U8),
        state: StateLayout::Flat {
            condition: Field::new(25, Width::U8),
            non_seq: Field::new(26, Width::U8),
            reset: Field::new(27, Width::U8),
        },
        length: Field::new(8, Width::U64),
        start: Field::new(0, Width::U64),
        write_pointer: Field::new(16, Width::U64),
        capacity: Some(Field::new(32, Width::U64)),
    },
    request: RequestLayout {
        start_lba: Field::new(0, Width::U64),
        capacity: Field::new(8, Width::U32),
        capacity_unit: CapacityUnit::Zones,
        option: None,
        force_unit_access: None,
    },
};

/// Decoded report header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    pub descriptor_count: u32,
    pub same_code: SameCode,
    pub maximum_lba: u64,
    pub flags: u32,
}

impl EnvelopeLayout {
    /// Decode the header. A buffer too short to hold it reads as an empty report.
    pub fn decode(&self, buf: &[u8], order: Endianness) -> Envelope {
        if buf.len() < self.size {
            return Envelope::default();
        }
        let read = |field: Option<Field>| field.and_then(|f| f.read(buf, order)).unwrap_or(0);
        Envelope {
            descriptor_count: self.descriptor_count.read(buf, order).unwrap_or(0) as u32,
            same_code: SameCode::from(read(self.same_field) as u8),
            maximum_lba: read(self.maximum_lba) & self.maximum_lba_mask,
            flags: read(self.flags) as u32,
        }
    }

    pub fn encode(&self, buf: &mut [u8], order: Endianness, envelope: &Envelope) {
        self.descriptor_count
            .write(buf, order, envelope.descriptor_count as u64);
        if let Some(field) = self.same_field {
            field.write(buf, order, envelope.same_code.code() as u64);
        }
        if let Some(field) = self.maximum_lba {
            field.write(buf, order, envelope.maximum_lba);
        }
        if let Some(field) = self.flags {
            field.write(buf, order, envelope.flags as u64);
        }
    }
}

impl DescriptorLayout {
    /// Decode one descriptor from `raw`, which starts at the descriptor.
    /// `with_capacity` tells whether the capacity slot holds valid data.
    pub fn decode(&self, raw: &[u8], order: Endianness, with_capacity: bool) -> Option<ZoneDescriptor> {
        if raw.len() < self.size {
            return None;
        }
        let byte = |field: Field| field.read(raw, order).map(|v| v as u8);
        let (condition, non_seq, reset) = match self.state {
            StateLayout::Packed { flags } => {
                let flags = byte(flags)?;
                (flags >> 4, flags & 0x02 != 0, flags & 0x01 != 0)
            }
            StateLayout::Flat {
                condition,
                non_seq,
                reset,
            } => (byte(condition)?, byte(non_seq)? != 0, byte(reset)? != 0),
        };

        Some(ZoneDescriptor {
            zone_type: ZoneType::from(byte(self.zone_type)?),
            condition: ZoneCondition::from(condition),
            start_lba: self.start.read(raw, order)?,
            length_sectors: self.length.read(raw, order)?,
            write_pointer_lba: self.write_pointer.read(raw, order)?,
            reset_recommended: reset,
            non_sequential_resources_active: non_seq,
            capacity: match self.capacity {
                Some(field) if with_capacity => field.read(raw, order),
                _ => None,
            },
        })
    }

    /// Store `zone` at the start of `raw`
    pub fn encode(&self, raw: &mut [u8], order: Endianness, zone: &ZoneDescriptor) {
        self.zone_type.write(raw, order, zone.zone_type.code() as u64);
        match self.state {
            StateLayout::Packed { flags } => {
                let packed = (zone.condition.code() << 4)
                    | (u8::from(zone.non_sequential_resources_active) << 1)
                    | u8::from(zone.reset_recommended);
                flags.write(raw, order, packed as u64);
            }
            StateLayout::Flat {
                condition,
                non_seq,
                reset,
            } => {
                condition.write(raw, order, zone.condition.code() as u64);
                non_seq.write(raw, order, zone.non_sequential_resources_active as u64);
                reset.write(raw, order, zone.reset_recommended as u64);
            }
        }
        self.start.write(raw, order, zone.start_lba);
        self.length.write(raw, order, zone.length_sectors);
        self.write_pointer.write(raw, order, zone.write_pointer_lba);
        if let (Some(field), Some(capacity)) = (self.capacity, zone.capacity) {
            field.write(raw, order, capacity);
        }
    }
}

impl Schema {
    /// Fill in the report request at the start of a result buffer
    pub fn encode_request(&self, buf: &mut [u8], start_lba: u64, option: u8, force_unit_access: bool) {
        let order = Endianness::Native;
        let request = &self.request;
        request.start_lba.write(buf, order, start_lba);
        let capacity = match request.capacity_unit {
            CapacityUnit::Bytes => buf.len(),
            CapacityUnit::Zones => buf.len().saturating_sub(self.envelope.size) / self.descriptor.size,
        };
        request.capacity.write(buf, order, capacity as u64);
        if let Some(field) = request.option {
            field.write(buf, order, option as u64);
        }
        if let Some(field) = request.force_unit_access {
            field.write(buf, order, force_unit_access as u64);
        }
    }
}

/// `{sector, nr_sectors}` range for the current interface zone management calls
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneRange {
    pub sector: u64,
    pub nr_sectors: u64,
}

const RANGE_SECTOR: Field = Field::new(0, Width::U64);
const RANGE_NR_SECTORS: Field = Field::new(8, Width::U64);

impl ZoneRange {
    /// Host order wire image
    pub fn to_bytes(&self) -> [u8; RANGE_SIZE] {
        let mut raw = [0u8; RANGE_SIZE];
        RANGE_SECTOR.write(&mut raw, Endianness::Native, self.sector);
        RANGE_NR_SECTORS.write(&mut raw, Endianness::Native, self.nr_sectors);
        raw
    }

    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        Some(Self {
            sector: RANGE_SECTOR.read(raw, Endianness::Native)?,
            nr_sectors: RANGE_NR_SECTORS.read(raw, Endianness::Native)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order() {
        let field = Field::new(2, Width::U32);
        let mut buf = [0u8; 8];
        assert!(field.write(&mut buf, Endianness::Big, 0x0102_0304));
        assert_eq!(buf, [0, 0, 1, 2, 3, 4, 0, 0]);
        assert_eq!(field.read(&buf, Endianness::Big), Some(0x0102_0304));
        assert_eq!(field.read(&buf, Endianness::Little), Some(0x0403_0201));
    }

    #[test]
    fn test_field_bounds() {
        let field = Field::new(4, Width::U64);
        let mut buf = [0xffu8; 11];
        assert_eq!(field.read(&buf, Endianness::Native), None);
        assert!(!field.write(&mut buf, Endianness::Native, 1));
        assert_eq!(buf, [0xff; 11]);
    }

    #[test]
    fn test_packed_flags() {
        let layout = &Format::Legacy.schema().descriptor;
        let mut raw = [0u8; 64];
        raw[0] = 0x02;
        raw[1] = 0x43;
        raw[8..16].copy_from_slice(&0x80000u64.to_be_bytes());
        raw[16..24].copy_from_slice(&0x100000u64.to_be_bytes());
        raw[24..32].copy_from_slice(&0x100008u64.to_be_bytes());

        let zone = layout.decode(&raw, Endianness::Big, false).unwrap();
        assert_eq!(zone.zone_type, ZoneType::SequentialWriteRequired);
        assert_eq!(zone.condition, ZoneCondition::Closed);
        assert!(zone.reset_recommended);
        assert!(zone.non_sequential_resources_active);
        assert_eq!(zone.length_sectors, 0x80000);
        assert_eq!(zone.start_lba, 0x100000);
        assert_eq!(zone.write_pointer_offset(), Some(8));

        let mut again = [0u8; 64];
        layout.encode(&mut again, Endianness::Big, &zone);
        assert_eq!(again, raw);
    }

    #[test]
    fn test_flat_descriptor() {
        let layout = &Format::Current.schema().descriptor;
        let mut zone = ZoneDescriptor::sequential(0x200000, 0x80000);
        zone.condition = ZoneCondition::Full;
        zone.write_pointer_lba = zone.end_lba();
        zone.capacity = Some(0x70000);

        let mut raw = [0u8; 64];
        layout.encode(&mut raw, Endianness::Native, &zone);
        assert_eq!(raw[24], 2);
        assert_eq!(raw[25], 0xe);
        assert_eq!(layout.decode(&raw, Endianness::Native, true), Some(zone));
        let without = layout.decode(&raw, Endianness::Native, false).unwrap();
        assert_eq!(without.capacity, None);
    }

    #[test]
    fn test_legacy_max_lba_mask() {
        let envelope = &Format::Legacy.schema().envelope;
        let mut buf = [0u8; 64];
        buf[8..16].copy_from_slice(&0xabcd_0000_1234_5678u64.to_be_bytes());
        assert_eq!(envelope.decode(&buf, Endianness::Big).maximum_lba, 0x1234_5678);
        assert_eq!(envelope.decode(&buf[..63], Endianness::Big), Envelope::default());
    }

    #[test]
    fn test_request_layouts() {
        let mut buf = vec![0u8; 4096];
        let schema = Format::Interim.schema();
        schema.encode_request(&mut buf, 0x80000, 0x81, true);
        assert_eq!(&buf[0..8], &0x80000u64.to_ne_bytes());
        assert_eq!(&buf[8..12], &4096u32.to_ne_bytes());
        assert_eq!(buf[12], 0x81);
        assert_eq!(buf[13], 1);

        let mut buf = vec![0u8; 4096];
        let schema = Format::Current.schema();
        schema.encode_request(&mut buf, 0x80000, 0x81, true);
        assert_eq!(&buf[8..12], &63u32.to_ne_bytes());
        assert_eq!(&buf[12..16], &[0u8; 4]);
    }

    #[test]
    fn test_capacity() {
        assert_eq!(Format::Legacy.descriptor_capacity(512), 7);
        assert_eq!(Format::Current.descriptor_capacity(512), 7);
        assert_eq!(Format::Legacy.descriptor_capacity(32), 0);
        assert_eq!(Format::Current.descriptor_capacity(80), 1);
    }

    #[test]
    fn test_range_bytes() {
        let range = ZoneRange {
            sector: 0x80000,
            nr_sectors: 0x100000,
        };
        let raw = range.to_bytes();
        assert_eq!(&raw[0..8], &0x80000u64.to_ne_bytes());
        assert_eq!(ZoneRange::from_bytes(&raw), Some(range));
    }
}
