// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Mock device for testing.
//!
//! [`MockDevice`] records every call it receives and answers report queries
//! with a canned result image, usually produced by [`ReportImage`].

use nix::errno::Errno;

use crate::{
    action::ZoneCommand,
    device::DeviceControl,
    format::{Endianness, Envelope, Format},
    zone::{SameCode, ZoneDescriptor},
};

/// Bytes of the request header kept when recording a report call
const RECORDED_REQUEST: usize = 16;

/// A call received by a [`MockDevice`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Report {
        format: Format,
        /// Request header as written by the caller
        request: Vec<u8>,
        /// Buffer length
        len: usize,
    },
    Command(ZoneCommand),
}

#[derive(Debug, Default)]
pub struct MockDevice {
    response: Vec<u8>,
    failure: Option<Errno>,
    calls: Vec<Call>,
}

impl MockDevice {
    /// A device that accepts every command and reports nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer report calls with `response`, truncated to the caller's buffer
    pub fn with_response(response: Vec<u8>) -> Self {
        Self {
            response,
            ..Self::default()
        }
    }

    /// Fail every call with `errno`
    pub fn failing(errno: Errno) -> Self {
        Self {
            failure: Some(errno),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    fn outcome(&self) -> nix::Result<()> {
        self.failure.map_or(Ok(()), Err)
    }
}

impl DeviceControl for MockDevice {
    fn report_zones(&mut self, format: Format, buffer: &mut [u8]) -> nix::Result<()> {
        self.calls.push(Call::Report {
            format,
            request: buffer[..buffer.len().min(RECORDED_REQUEST)].to_vec(),
            len: buffer.len(),
        });
        self.outcome()?;

        let n = buffer.len().min(self.response.len());
        buffer[..n].copy_from_slice(&self.response[..n]);
        buffer[n..].fill(0);
        Ok(())
    }

    fn zone_command(&mut self, command: &ZoneCommand) -> nix::Result<()> {
        self.calls.push(Call::Command(*command));
        self.outcome()
    }
}

/// Builder for raw report results as a device would return them
#[derive(Clone, Debug)]
pub struct ReportImage {
    format: Format,
    order: Endianness,
    zones: Vec<ZoneDescriptor>,
    declared: Option<u32>,
    same: SameCode,
    maximum_lba: u64,
    flags: u32,
}

impl ReportImage {
    pub fn new(format: Format, order: Endianness) -> Self {
        Self {
            format,
            order,
            zones: Vec::new(),
            declared: None,
            same: SameCode::default(),
            maximum_lba: 0,
            flags: 0,
        }
    }

    pub fn zones(self, zones: Vec<ZoneDescriptor>) -> Self {
        Self { zones, ..self }
    }

    /// Override the descriptor count, which otherwise matches the zones given
    pub fn declared(self, declared: u32) -> Self {
        Self {
            declared: Some(declared),
            ..self
        }
    }

    pub fn same(self, same: SameCode) -> Self {
        Self { same, ..self }
    }

    pub fn maximum_lba(self, maximum_lba: u64) -> Self {
        Self { maximum_lba, ..self }
    }

    pub fn flags(self, flags: u32) -> Self {
        Self { flags, ..self }
    }

    /// Encode into a buffer of exactly `len` bytes, dropping what does not fit
    pub fn encode(&self, len: usize) -> Vec<u8> {
        let schema = self.format.schema();
        let mut buf = vec![0u8; len];

        let envelope = Envelope {
            descriptor_count: self.declared.unwrap_or(self.zones.len() as u32),
            same_code: self.same,
            maximum_lba: self.maximum_lba,
            flags: self.flags,
        };
        if len >= schema.envelope.size {
            schema.envelope.encode(&mut buf, self.order, &envelope);
        }

        let size = schema.descriptor.size;
        let slots = buf.get_mut(schema.envelope.size..).unwrap_or_default();
        for (raw, zone) in slots.chunks_exact_mut(size).zip(&self.zones) {
            schema.descriptor.encode(raw, self.order, zone);
        }
        buf
    }
}
