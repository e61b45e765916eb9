// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Zone state changes: open, close, finish and reset

use std::fmt;

use log::{debug, info};

use crate::{device::DeviceControl, format::Format, format::ZoneRange, Error, Operation, ValidationError};

/// Legacy and interim calls take the target LBA by value; the low bit of it is
/// the force unit access flag, so real targets must be even.
const FUA_BIT: u64 = 0x1;

/// Legacy and interim "every zone" target
const ALL_ZONES_LBA: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneAction {
    Open,
    Close,
    Finish,
    Reset,
}

impl fmt::Display for ZoneAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneAction::Open => f.write_str("open"),
            ZoneAction::Close => f.write_str("close"),
            ZoneAction::Finish => f.write_str("finish"),
            ZoneAction::Reset => f.write_str("reset"),
        }
    }
}

/// A zone action as asked for by the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneActionRequest {
    pub action: ZoneAction,
    /// Start of the target zone, ignored when applying to every zone
    pub target_lba: u64,
    pub apply_to_all_zones: bool,
    pub force_unit_access: bool,
}

impl ZoneActionRequest {
    /// Act on the zone starting at `target_lba`
    pub fn new(action: ZoneAction, target_lba: u64) -> Self {
        Self {
            action,
            target_lba,
            apply_to_all_zones: false,
            force_unit_access: false,
        }
    }

    /// Act on every zone of the device
    pub fn all_zones(action: ZoneAction) -> Self {
        Self {
            apply_to_all_zones: true,
            ..Self::new(action, 0)
        }
    }

    pub fn with_force_unit_access(self, force_unit_access: bool) -> Self {
        Self {
            force_unit_access,
            ..self
        }
    }
}

/// What is known about the device, in 512 byte sectors. Zero means unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Geometry {
    pub capacity_sectors: u64,
    /// Bytes
    pub logical_block_size: u64,
    pub zone_sectors: u64,
}

/// The exact device call an action turns into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneCommand {
    /// Legacy and interim: LBA (with the fua bit folded in) by value
    Value { action: ZoneAction, argument: u64 },
    /// Current: a `{sector, nr_sectors}` range
    Range { action: ZoneAction, range: ZoneRange },
}

impl ZoneCommand {
    pub fn action(&self) -> ZoneAction {
        match self {
            ZoneCommand::Value { action, .. } | ZoneCommand::Range { action, .. } => *action,
        }
    }

    /// Translate a request into a command, without touching the device
    pub fn build(format: Format, request: &ZoneActionRequest, geometry: &Geometry) -> Result<Self, ValidationError> {
        let action = request.action;
        let lba = request.target_lba;

        if request.apply_to_all_zones && lba != 0 {
            return Err(ValidationError::AllZonesWithTarget(lba));
        }
        if !request.apply_to_all_zones {
            if geometry.zone_sectors != 0 && lba % geometry.zone_sectors != 0 {
                return Err(ValidationError::Misaligned {
                    lba,
                    alignment: geometry.zone_sectors,
                });
            }
            if geometry.capacity_sectors != 0 && lba >= geometry.capacity_sectors {
                return Err(ValidationError::BeyondDevice {
                    lba,
                    capacity: geometry.capacity_sectors,
                });
            }
        }

        match format {
            Format::Legacy | Format::Interim => {
                if action == ZoneAction::Finish {
                    return Err(ValidationError::Unsupported {
                        feature: "finish zone",
                        format,
                    });
                }
                if request.apply_to_all_zones {
                    return Ok(ZoneCommand::Value {
                        action,
                        argument: ALL_ZONES_LBA,
                    });
                }
                if lba & FUA_BIT != 0 {
                    return Err(ValidationError::Misaligned { lba, alignment: 2 });
                }
                let argument = if request.force_unit_access { lba | FUA_BIT } else { lba };
                Ok(ZoneCommand::Value { action, argument })
            }
            Format::Current => {
                if request.force_unit_access {
                    return Err(ValidationError::Unsupported {
                        feature: "force unit access",
                        format,
                    });
                }
                let range = if request.apply_to_all_zones {
                    if geometry.capacity_sectors == 0 {
                        return Err(ValidationError::UnknownCapacity);
                    }
                    ZoneRange {
                        sector: 0,
                        nr_sectors: geometry.capacity_sectors,
                    }
                } else {
                    if geometry.zone_sectors == 0 {
                        return Err(ValidationError::UnknownZoneSize);
                    }
                    let nr_sectors = match geometry.capacity_sectors {
                        0 => geometry.zone_sectors,
                        capacity => geometry.zone_sectors.min(capacity - lba),
                    };
                    ZoneRange { sector: lba, nr_sectors }
                };
                Ok(ZoneCommand::Range { action, range })
            }
        }
    }
}

/// Validate and issue a single zone action. Exactly one device call is made on
/// success and none on a validation failure. Nothing is retried.
pub fn act<D: DeviceControl + ?Sized>(
    device: &mut D,
    format: Format,
    request: &ZoneActionRequest,
    geometry: &Geometry,
) -> Result<ZoneCommand, Error> {
    let command = ZoneCommand::build(format, request, geometry)?;
    debug!("{format} zone command: {command:?}");

    device
        .zone_command(&command)
        .map_err(|errno| Error::device(Operation::Action(request.action), errno))?;

    if request.apply_to_all_zones {
        info!("{} all zones: success", request.action);
    } else {
        info!("{} zone at {:#x}: success", request.action, request.target_lba);
    }
    Ok(command)
}

/// Reset of `zone_count` consecutive zones starting at `start_sector`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetRange {
    pub start_sector: u64,
    pub zone_count: u64,
}

impl ResetRange {
    pub fn new(start_sector: u64, zone_count: u64) -> Self {
        Self {
            start_sector,
            zone_count,
        }
    }

    /// Sector range to reset, clamped to the end of the device
    pub fn resolve(&self, geometry: &Geometry) -> Result<ZoneRange, ValidationError> {
        let zone_sectors = geometry.zone_sectors;
        if zone_sectors == 0 {
            return Err(ValidationError::UnknownZoneSize);
        }
        if self.start_sector % zone_sectors != 0 {
            return Err(ValidationError::Misaligned {
                lba: self.start_sector,
                alignment: zone_sectors,
            });
        }
        if self.zone_count == 0 {
            return Err(ValidationError::NoZones);
        }
        let capacity = geometry.capacity_sectors;
        if capacity == 0 {
            return Err(ValidationError::UnknownCapacity);
        }
        if self.start_sector >= capacity {
            return Err(ValidationError::BeyondDevice {
                lba: self.start_sector,
                capacity,
            });
        }

        let wanted = self.zone_count.saturating_mul(zone_sectors);
        Ok(ZoneRange {
            sector: self.start_sector,
            nr_sectors: wanted.min(capacity - self.start_sector),
        })
    }
}

/// Reset a run of zones with the current interface
pub fn reset_range<D: DeviceControl + ?Sized>(
    device: &mut D,
    range: &ResetRange,
    geometry: &Geometry,
) -> Result<ZoneRange, Error> {
    let resolved = range.resolve(geometry)?;
    let command = ZoneCommand::Range {
        action: ZoneAction::Reset,
        range: resolved,
    };
    device
        .zone_command(&command)
        .map_err(|errno| Error::device(Operation::Action(ZoneAction::Reset), errno))?;

    info!(
        "reset {} sectors from {:#x}",
        resolved.nr_sectors, resolved.sector
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use nix::errno::Errno;

    use super::*;
    use crate::mock::{Call, MockDevice};

    const ZONE: u64 = 0x80000;

    fn geometry() -> Geometry {
        Geometry {
            capacity_sectors: 10 * ZONE,
            logical_block_size: 4096,
            zone_sectors: ZONE,
        }
    }

    #[test_log::test]
    fn test_all_zones_with_target_rejected() {
        let mut device = MockDevice::new();
        let mut request = ZoneActionRequest::all_zones(ZoneAction::Reset);
        request.target_lba = 4096;

        for format in [Format::Legacy, Format::Interim, Format::Current] {
            let err = act(&mut device, format, &request, &geometry()).unwrap_err();
            assert!(matches!(
                err,
                Error::Validation(ValidationError::AllZonesWithTarget(4096))
            ));
        }
        assert_eq!(device.call_count(), 0);
    }

    #[test]
    fn test_legacy_encoding() {
        let request = ZoneActionRequest::new(ZoneAction::Open, 2 * ZONE).with_force_unit_access(true);
        let command = ZoneCommand::build(Format::Legacy, &request, &geometry()).unwrap();
        assert_eq!(
            command,
            ZoneCommand::Value {
                action: ZoneAction::Open,
                argument: 2 * ZONE | 1
            }
        );

        let request = ZoneActionRequest::all_zones(ZoneAction::Close);
        let command = ZoneCommand::build(Format::Interim, &request, &geometry()).unwrap();
        assert_eq!(
            command,
            ZoneCommand::Value {
                action: ZoneAction::Close,
                argument: u64::MAX
            }
        );
    }

    #[test]
    fn test_legacy_restrictions() {
        let odd = ZoneActionRequest::new(ZoneAction::Reset, 0x1001);
        assert_eq!(
            ZoneCommand::build(Format::Legacy, &odd, &Geometry::default()),
            Err(ValidationError::Misaligned { lba: 0x1001, alignment: 2 })
        );

        let finish = ZoneActionRequest::new(ZoneAction::Finish, 0);
        assert!(matches!(
            ZoneCommand::build(Format::Interim, &finish, &geometry()),
            Err(ValidationError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_current_encoding() {
        let request = ZoneActionRequest::new(ZoneAction::Finish, 9 * ZONE);
        let command = ZoneCommand::build(Format::Current, &request, &geometry()).unwrap();
        assert_eq!(
            command,
            ZoneCommand::Range {
                action: ZoneAction::Finish,
                range: ZoneRange {
                    sector: 9 * ZONE,
                    nr_sectors: ZONE
                }
            }
        );

        let request = ZoneActionRequest::all_zones(ZoneAction::Reset);
        let command = ZoneCommand::build(Format::Current, &request, &geometry()).unwrap();
        assert_eq!(
            command,
            ZoneCommand::Range {
                action: ZoneAction::Reset,
                range: ZoneRange {
                    sector: 0,
                    nr_sectors: 10 * ZONE
                }
            }
        );

        let fua = ZoneActionRequest::new(ZoneAction::Open, 0).with_force_unit_access(true);
        assert!(ZoneCommand::build(Format::Current, &fua, &geometry()).is_err());

        let unknown = Geometry {
            zone_sectors: 0,
            ..geometry()
        };
        assert_eq!(
            ZoneCommand::build(Format::Current, &ZoneActionRequest::new(ZoneAction::Open, 0), &unknown),
            Err(ValidationError::UnknownZoneSize)
        );
    }

    #[test]
    fn test_alignment_and_bounds() {
        let geometry = geometry();
        let misaligned = ZoneActionRequest::new(ZoneAction::Open, ZONE + 8);
        assert!(matches!(
            ZoneCommand::build(Format::Current, &misaligned, &geometry),
            Err(ValidationError::Misaligned { alignment: ZONE, .. })
        ));

        let beyond = ZoneActionRequest::new(ZoneAction::Open, 10 * ZONE);
        assert!(matches!(
            ZoneCommand::build(Format::Legacy, &beyond, &geometry),
            Err(ValidationError::BeyondDevice { .. })
        ));
    }

    #[test_log::test]
    fn test_single_call() {
        let mut device = MockDevice::new();
        let request = ZoneActionRequest::new(ZoneAction::Close, ZONE);
        let command = act(&mut device, Format::Current, &request, &geometry()).unwrap();
        assert_eq!(device.calls(), &[Call::Command(command)]);
    }

    #[test]
    fn test_device_error_is_reported_once() {
        let mut device = MockDevice::failing(Errno::EIO);
        let request = ZoneActionRequest::new(ZoneAction::Reset, 0);
        let err = act(&mut device, Format::Legacy, &request, &geometry()).unwrap_err();
        assert!(err.is_device());
        assert_eq!(err.raw_os_error(), Some(Errno::EIO as i32));
        assert_eq!(device.call_count(), 1);
    }

    #[test]
    fn test_reset_range() {
        let geometry = geometry();
        let range = ResetRange::new(8 * ZONE, 5).resolve(&geometry).unwrap();
        assert_eq!(range.sector, 8 * ZONE);
        assert_eq!(range.nr_sectors, 2 * ZONE);

        assert_eq!(ResetRange::new(0, 0).resolve(&geometry), Err(ValidationError::NoZones));
        assert_eq!(
            ResetRange::new(10 * ZONE, 1).resolve(&geometry),
            Err(ValidationError::BeyondDevice {
                lba: 10 * ZONE,
                capacity: 10 * ZONE
            })
        );
        assert_eq!(
            ResetRange::new(0, 1).resolve(&Geometry::default()),
            Err(ValidationError::UnknownZoneSize)
        );
        assert!(ResetRange::new(ZONE / 2, 1).resolve(&geometry).is_err());

        let mut device = MockDevice::new();
        reset_range(&mut device, &ResetRange::new(0, 1), &geometry).unwrap();
        assert_eq!(device.call_count(), 1);
    }
}
