// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Report zones: request, lazy decode and the normalized report

use log::{debug, info, warn};

use crate::{
    device::DeviceControl,
    endian::{self, EndianPolicy, Resolution},
    format::{Endianness, Envelope, Format, Schema, REPORT_FLAG_CAPACITY, REPORT_OPTION_MODIFIER},
    zone::{SameCode, ZoneCondition, ZoneDescriptor},
    Error, Operation, ValidationError, SECTOR_SIZE,
};

/// Smallest report buffer
pub const MIN_REPORT_LEN: usize = 512;

/// Largest report buffer
pub const MAX_REPORT_LEN: usize = 512 * 1024;

/// Round a requested buffer length down to whole sectors and clamp it to
/// `[MIN_REPORT_LEN, MAX_REPORT_LEN]`
pub fn clamp_report_length(requested: u64) -> usize {
    let rounded = requested / SECTOR_SIZE * SECTOR_SIZE;
    rounded.clamp(MIN_REPORT_LEN as u64, MAX_REPORT_LEN as u64) as usize
}

/// Device-side selection of the zones to report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ReportFilter {
    /// Every zone
    #[default]
    All = 0x00,
    Empty = 0x01,
    ImplicitOpen = 0x02,
    ExplicitOpen = 0x03,
    Closed = 0x04,
    Full = 0x05,
    ReadOnly = 0x06,
    Offline = 0x07,
    /// Zones with the reset recommended bit
    NeedReset = 0x10,
    /// Zones with non-sequential write resources active
    NonSequential = 0x11,
    /// Conventional zones
    NonWritePointer = 0x3f,
}

impl TryFrom<u64> for ReportFilter {
    type Error = ValidationError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Ok(match raw {
            0x00 => ReportFilter::All,
            0x01 => ReportFilter::Empty,
            0x02 => ReportFilter::ImplicitOpen,
            0x03 => ReportFilter::ExplicitOpen,
            0x04 => ReportFilter::Closed,
            0x05 => ReportFilter::Full,
            0x06 => ReportFilter::ReadOnly,
            0x07 => ReportFilter::Offline,
            0x10 => ReportFilter::NeedReset,
            0x11 => ReportFilter::NonSequential,
            0x3f => ReportFilter::NonWritePointer,
            _ => return Err(ValidationError::InvalidReportFilter(raw)),
        })
    }
}

impl ReportFilter {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Host-side equivalent of the filter, for interfaces that cannot filter
    pub fn matches(self, zone: &ZoneDescriptor) -> bool {
        match self {
            ReportFilter::All => true,
            ReportFilter::Empty => zone.condition == ZoneCondition::Empty,
            ReportFilter::ImplicitOpen => zone.condition == ZoneCondition::ImplicitOpen,
            ReportFilter::ExplicitOpen => zone.condition == ZoneCondition::ExplicitOpen,
            ReportFilter::Closed => zone.condition == ZoneCondition::Closed,
            ReportFilter::Full => zone.condition == ZoneCondition::Full,
            ReportFilter::ReadOnly => zone.condition == ZoneCondition::ReadOnly,
            ReportFilter::Offline => zone.condition == ZoneCondition::Offline,
            ReportFilter::NeedReset => zone.reset_recommended,
            ReportFilter::NonSequential => zone.non_sequential_resources_active,
            ReportFilter::NonWritePointer => zone.condition == ZoneCondition::NotWritePointer,
        }
    }
}

/// Parameters of a single report zones query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportRequest {
    pub format: Format,
    /// First sector to report from
    pub start_lba: u64,
    /// Result buffer size in bytes
    pub length: usize,
    pub filter: ReportFilter,
    /// Interim only
    pub force_unit_access: bool,
    /// Legacy only: route through ATA pass-through
    pub ata_passthrough: bool,
    /// Interim only: partial report
    pub partial: bool,
    pub endianness: EndianPolicy,
}

impl ReportRequest {
    pub fn new(format: Format, start_lba: u64) -> Self {
        Self {
            format,
            start_lba,
            length: MAX_REPORT_LEN,
            filter: ReportFilter::All,
            force_unit_access: false,
            ata_passthrough: false,
            partial: false,
            endianness: EndianPolicy::Detect,
        }
    }

    pub fn with_length(self, length: usize) -> Self {
        Self { length, ..self }
    }

    pub fn with_filter(self, filter: ReportFilter) -> Self {
        Self { filter, ..self }
    }

    pub fn with_force_unit_access(self, force_unit_access: bool) -> Self {
        Self {
            force_unit_access,
            ..self
        }
    }

    pub fn with_ata_passthrough(self, ata_passthrough: bool) -> Self {
        Self {
            ata_passthrough,
            ..self
        }
    }

    pub fn with_partial(self, partial: bool) -> Self {
        Self { partial, ..self }
    }

    pub fn with_endianness(self, endianness: EndianPolicy) -> Self {
        Self { endianness, ..self }
    }

    /// Checks everything that can be checked without the device
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_REPORT_LEN..=MAX_REPORT_LEN).contains(&self.length) || self.length % SECTOR_SIZE as usize != 0 {
            return Err(ValidationError::ReportLength(self.length));
        }
        let unsupported = |feature| ValidationError::Unsupported {
            feature,
            format: self.format,
        };
        if self.ata_passthrough && self.format != Format::Legacy {
            return Err(unsupported("ATA pass-through"));
        }
        if self.partial && self.format != Format::Interim {
            return Err(unsupported("partial report"));
        }
        if self.force_unit_access && self.format != Format::Interim {
            return Err(unsupported("force unit access"));
        }
        Ok(())
    }

    fn option_byte(&self) -> u8 {
        let mut option = self.filter.code();
        if self.ata_passthrough || self.partial {
            option |= REPORT_OPTION_MODIFIER;
        }
        option
    }

    /// Write the request into the head of a result buffer
    pub fn encode(&self, buf: &mut [u8]) {
        self.format
            .schema()
            .encode_request(buf, self.start_lba, self.option_byte(), self.force_unit_access);
    }
}

/// The device declared more descriptors than the buffer could hold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Truncation {
    pub declared: u32,
    pub capacity: u32,
}

impl Truncation {
    /// Descriptors that did not fit
    pub fn dropped(&self) -> u32 {
        self.declared - self.capacity
    }
}

/// Borrowed view over a raw report buffer with a resolved byte order
#[derive(Clone, Copy, Debug)]
pub struct ReportView<'a> {
    buf: &'a [u8],
    schema: &'static Schema,
    order: Endianness,
    envelope: Envelope,
}

impl<'a> ReportView<'a> {
    pub fn new(format: Format, buf: &'a [u8], order: Endianness) -> Self {
        let schema = format.schema();
        Self {
            buf,
            schema,
            order,
            envelope: schema.envelope.decode(buf, order),
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Descriptors the buffer has room for
    pub fn capacity(&self) -> u32 {
        let schema = self.schema;
        let room = self.buf.len().saturating_sub(schema.envelope.size) / schema.descriptor.size;
        u32::try_from(room).unwrap_or(u32::MAX)
    }

    pub fn truncation(&self) -> Option<Truncation> {
        let capacity = self.capacity();
        (self.envelope.descriptor_count > capacity).then_some(Truncation {
            declared: self.envelope.descriptor_count,
            capacity,
        })
    }

    /// Lazily decode `min(declared, capacity)` descriptors, stopping early at the
    /// first zero length descriptor
    pub fn descriptors(&self) -> Descriptors<'a> {
        Descriptors {
            buf: self.buf,
            schema: self.schema,
            order: self.order,
            with_capacity: self.envelope.flags & REPORT_FLAG_CAPACITY != 0,
            index: 0,
            limit: self.envelope.descriptor_count.min(self.capacity()) as usize,
        }
    }
}

/// Iterator over the descriptors of a [`ReportView`]
#[derive(Debug)]
pub struct Descriptors<'a> {
    buf: &'a [u8],
    schema: &'static Schema,
    order: Endianness,
    with_capacity: bool,
    index: usize,
    limit: usize,
}

impl Iterator for Descriptors<'_> {
    type Item = ZoneDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.limit {
            return None;
        }
        let layout = &self.schema.descriptor;
        let offset = self.schema.envelope.size + self.index * layout.size;
        let zone = self
            .buf
            .get(offset..)
            .and_then(|raw| layout.decode(raw, self.order, self.with_capacity));

        match zone {
            Some(zone) if zone.length_sectors != 0 => {
                self.index += 1;
                Some(zone)
            }
            _ => {
                self.index = self.limit;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.limit - self.index))
    }
}

/// A decoded batch of zone descriptors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneReport {
    /// Count declared by the device
    pub descriptor_count: u32,
    pub same_code: SameCode,
    /// Zero for the current interface, which does not report it
    pub maximum_lba: u64,
    pub endianness: Resolution,
    /// Set when the declared count exceeded the buffer
    pub truncation: Option<Truncation>,
    pub descriptors: Vec<ZoneDescriptor>,
}

impl ZoneReport {
    /// Decode a filled result buffer
    pub fn decode(format: Format, buf: &[u8], endianness: Resolution) -> Self {
        let view = ReportView::new(format, buf, endianness.endianness);
        let envelope = view.envelope();
        let truncation = view.truncation();
        if let Some(t) = truncation {
            info!("Truncating report to {} of {} zones.", t.capacity, t.declared);
        }

        let descriptors: Vec<_> = view.descriptors().collect();
        for zone in descriptors.iter().filter(|z| z.zone_type.has_write_pointer() && !z.is_consistent()) {
            warn!(
                "zone at {:#x}: write pointer {:#x} outside of the zone",
                zone.start_lba, zone.write_pointer_lba
            );
        }

        Self {
            descriptor_count: envelope.descriptor_count,
            same_code: envelope.same_code,
            maximum_lba: envelope.maximum_lba,
            endianness,
            truncation,
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ZoneDescriptor> {
        self.descriptors.iter()
    }
}

impl<'a> IntoIterator for &'a ZoneReport {
    type Item = &'a ZoneDescriptor;
    type IntoIter = std::slice::Iter<'a, ZoneDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

/// Query the device and decode its zone report
///
/// The result buffer lives only for the duration of this call.
pub fn report<D: DeviceControl + ?Sized>(device: &mut D, request: &ReportRequest) -> Result<ZoneReport, Error> {
    request.validate()?;

    let mut buffer = vec![0u8; request.length];
    request.encode(&mut buffer);
    debug!(
        "report zones ({}) from {:#x}, {} bytes, option {:#04x}",
        request.format,
        request.start_lba,
        request.length,
        request.option_byte()
    );

    device
        .report_zones(request.format, &mut buffer)
        .map_err(|errno| Error::device(Operation::Report, errno))?;

    let resolution = endian::resolve(request.format, request.endianness, &buffer);
    let mut report = ZoneReport::decode(request.format, &buffer, resolution);
    info!("Found {} zones", report.descriptor_count);

    // The current interface has no device side filter
    if request.format == Format::Current && request.filter != ReportFilter::All {
        report.descriptors.retain(|zone| request.filter.matches(zone));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use nix::errno::Errno;

    use super::*;
    use crate::{
        mock::{Call, MockDevice, ReportImage},
        zone::ZoneType,
    };

    fn zones(lengths: &[u64]) -> Vec<ZoneDescriptor> {
        let mut start = 0;
        lengths
            .iter()
            .map(|&len| {
                let zone = ZoneDescriptor::sequential(start, len);
                start += len.max(1);
                zone
            })
            .collect()
    }

    #[test_log::test]
    fn test_legacy_scenario() {
        let image = ReportImage::new(Format::Legacy, Endianness::Big)
            .same(SameCode::AllSame)
            .zones(zones(&[0x100000, 0x100000, 0]))
            .declared(3);
        let buf = image.encode(256);

        let resolution = endian::resolve(Format::Legacy, EndianPolicy::Detect, &buf);
        // Pinned: the canonical length selects the big-endian decode
        assert_eq!(resolution.endianness, Endianness::Big);

        let report = ZoneReport::decode(Format::Legacy, &buf, resolution);
        assert_eq!(report.descriptor_count, 3);
        assert_eq!(report.same_code, SameCode::AllSame);
        assert_eq!(report.len(), 2);
        assert_eq!(report.truncation, None);
        assert_eq!(report.descriptors[1].start_lba, 0x100000);
    }

    #[test]
    fn test_truncation_invariant() {
        let lengths = [0x80000u64; 10];
        for declared in [0u32, 1, 3, 7, 10, 40] {
            for len in [0usize, 16, 64, 100, 128, 320, 512, 704, 1024] {
                let image = ReportImage::new(Format::Legacy, Endianness::Big)
                    .zones(zones(&lengths))
                    .declared(declared);
                let buf = image.encode(len);
                let capacity = Format::Legacy.descriptor_capacity(len) as u32;
                let expected = declared.min(capacity).min(lengths.len() as u32);

                let report = ZoneReport::decode(Format::Legacy, &buf, Resolution::fixed(Endianness::Big));
                assert_eq!(report.len() as u32, expected, "declared {declared}, len {len}");
                assert_eq!(report.truncation.is_some(), len >= 64 && declared > capacity);
            }
        }
    }

    #[test]
    fn test_zero_length_sentinel() {
        for format in [Format::Legacy, Format::Current] {
            let image = ReportImage::new(format, Endianness::Native)
                .zones(zones(&[0x80000, 0, 0x80000, 0x80000]))
                .declared(4);
            let report = ZoneReport::decode(format, &image.encode(4096), Resolution::fixed(Endianness::Native));
            assert_eq!(report.len(), 1, "{format}");
        }
    }

    #[test]
    fn test_endianness_round_trip() {
        let mut expected = zones(&[0x100000, 0x100000, 0x100000]);
        expected[0].zone_type = ZoneType::Conventional;
        expected[0].condition = ZoneCondition::NotWritePointer;
        expected[1].condition = ZoneCondition::Full;
        expected[1].write_pointer_lba = expected[1].end_lba();
        expected[2].condition = ZoneCondition::ImplicitOpen;
        expected[2].write_pointer_lba += 0x1234;
        expected[2].reset_recommended = true;

        let big = ReportImage::new(Format::Legacy, Endianness::Big)
            .zones(expected.clone())
            .maximum_lba(0x2fffff)
            .encode(1024);
        let native = ReportImage::new(Format::Legacy, Endianness::Native)
            .zones(expected.clone())
            .maximum_lba(0x2fffff)
            .encode(1024);

        let resolution = endian::resolve(Format::Legacy, EndianPolicy::Detect, &big);
        let from_big = ZoneReport::decode(Format::Legacy, &big, resolution);
        let from_native = ZoneReport::decode(Format::Legacy, &native, Resolution::fixed(Endianness::Native));

        assert_eq!(from_big.descriptors, expected);
        assert_eq!(from_big.descriptors, from_native.descriptors);
        assert_eq!(from_big.maximum_lba, from_native.maximum_lba);
    }

    #[test]
    fn test_empty_buffer() {
        for format in [Format::Legacy, Format::Interim, Format::Current] {
            let report = ZoneReport::decode(format, &[], Resolution::fixed(Endianness::Native));
            assert!(report.is_empty());
            assert_eq!(report.descriptor_count, 0);
        }
    }

    #[test_log::test]
    fn test_report_through_device() {
        let image = ReportImage::new(Format::Legacy, Endianness::Big)
            .zones(zones(&[0x80000, 0x80000]))
            .maximum_lba(0xfffff);
        let mut device = MockDevice::with_response(image.encode(MAX_REPORT_LEN));

        let request = ReportRequest::new(Format::Legacy, 0x80000)
            .with_length(4096)
            .with_filter(ReportFilter::Closed)
            .with_ata_passthrough(true);
        let report = report(&mut device, &request).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report.maximum_lba, 0xfffff);
        assert!(report.endianness.detected);

        let [Call::Report { format, request, len }] = device.calls() else {
            panic!("expected one report call: {:?}", device.calls());
        };
        assert_eq!(*format, Format::Legacy);
        assert_eq!(*len, 4096);
        assert_eq!(&request[0..8], &0x80000u64.to_ne_bytes());
        assert_eq!(&request[8..12], &4096u32.to_ne_bytes());
        assert_eq!(request[12], 0x84);
    }

    #[test]
    fn test_current_filters_host_side() {
        let mut list = zones(&[0x80000, 0x80000, 0x80000]);
        list[1].condition = ZoneCondition::Full;
        let image = ReportImage::new(Format::Current, Endianness::Native).zones(list);
        let mut device = MockDevice::with_response(image.encode(MAX_REPORT_LEN));

        let request = ReportRequest::new(Format::Current, 0)
            .with_length(1024)
            .with_filter(ReportFilter::Full);
        let report = report(&mut device, &request).unwrap();
        assert_eq!(report.descriptor_count, 3);
        assert_eq!(report.len(), 1);
        assert_eq!(report.descriptors[0].start_lba, 0x80000);
        assert!(!report.endianness.detected);
    }

    #[test_log::test]
    fn test_current_ignores_fixed_byte_order() {
        let image = ReportImage::new(Format::Current, Endianness::Native).zones(vec![ZoneDescriptor::sequential(0x80000, 0x80000)]);
        for order in [Endianness::Big, Endianness::Little] {
            let mut device = MockDevice::with_response(image.encode(MAX_REPORT_LEN));
            let request = ReportRequest::new(Format::Current, 0)
                .with_length(1024)
                .with_endianness(EndianPolicy::Fixed(order));
            let report = report(&mut device, &request).unwrap();
            assert_eq!(report.descriptor_count, 1, "{order}");
            assert_eq!(report.endianness, Resolution::fixed(Endianness::Native));
            assert_eq!(report.descriptors[0].start_lba, 0x80000);
        }
    }

    #[test]
    fn test_device_failure() {
        let mut device = MockDevice::failing(Errno::EOPNOTSUPP);
        let err = report(&mut device, &ReportRequest::new(Format::Current, 0)).unwrap_err();
        assert!(err.is_device());
        assert_eq!(err.raw_os_error(), Some(Errno::EOPNOTSUPP as i32));
        assert_eq!(device.call_count(), 1);
    }

    #[test]
    fn test_validation_before_device() {
        let mut device = MockDevice::new();
        let bad = [
            ReportRequest::new(Format::Legacy, 0).with_length(100),
            ReportRequest::new(Format::Legacy, 0).with_length(MAX_REPORT_LEN + 512),
            ReportRequest::new(Format::Legacy, 0).with_partial(true),
            ReportRequest::new(Format::Interim, 0).with_ata_passthrough(true),
            ReportRequest::new(Format::Current, 0).with_force_unit_access(true),
        ];
        for request in bad {
            let err = report(&mut device, &request).unwrap_err();
            assert!(err.is_validation(), "{request:?}");
        }
        assert_eq!(device.call_count(), 0);
    }

    #[test]
    fn test_filter_codes() {
        for code in [0u64, 1, 2, 3, 4, 5, 6, 7, 0x10, 0x11, 0x3f] {
            assert_eq!(ReportFilter::try_from(code).unwrap().code() as u64, code);
        }
        for code in [8u64, 0x0f, 0x12, 0x3e, 0x40, 0x80, 0x100] {
            assert_eq!(
                ReportFilter::try_from(code),
                Err(ValidationError::InvalidReportFilter(code))
            );
        }
    }

    #[test]
    fn test_clamp_report_length() {
        assert_eq!(clamp_report_length(0), 512);
        assert_eq!(clamp_report_length(1000), 512);
        assert_eq!(clamp_report_length(4097), 4096);
        assert_eq!(clamp_report_length(u64::MAX), MAX_REPORT_LEN);
    }
}
