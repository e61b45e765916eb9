// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! ZDM superblock handling
//!
//! ZDM is a device-mapper target that presents a host-managed or host-aware
//! zoned disk as a conventional block device. Its superblock lives at the very
//! start of the backing device and is protected by a CRC-32 computed over the
//! whole structure with the checksum field itself zeroed.

use std::fmt;

use crate::{Detection, Error};
use uuid::Uuid;
use zerocopy::*;

/// Starting position of the superblock in bytes
pub const START_POSITION: u64 = 0;

/// Offset of the magic signature, right after the checksum and reserved words
pub const MAGIC_OFFSET: u64 = 8;

/// "zonecDEV" followed by eight random bytes
pub const MAGIC: [u8; 16] = [
    0x7a, 0x6f, 0x6e, 0x65, 0x63, 0x44, 0x45, 0x56, 0x82, 0x65, 0xf5, 0x7f, 0x48, 0xba, 0x6d, 0x81,
];

const LABEL_LEN: usize = 64;

/// On-disk ZDM superblock.
///
/// The record was written with natural C alignment, so the two padding words are
/// spelled out to keep every field at its historical offset.
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct Zdm {
    /// CRC-32 over the full superblock with this field zeroed
    crc32: U32<LittleEndian>,
    reserved: U32<LittleEndian>,
    /// Magic signature
    magic: [u8; 16],
    /// Volume UUID
    uuid: [u8; 16],
    /// Packed as 0xMMMMmmpt
    version: U32<LittleEndian>,
    _pad0: [u8; 4],
    sect_start: U64<LittleEndian>,
    sect_size: U64<LittleEndian>,
    /// Zones reserved for metadata, 3 by default
    mz_metadata_zones: U32<LittleEndian>,
    /// Over-provisioned zones, 5 minimum
    mz_over_provision: U32<LittleEndian>,
    /// Blocks exposed through the dm table entry
    zdm_blocks: U64<LittleEndian>,
    discard: U32<LittleEndian>,
    disk_type: U32<LittleEndian>,
    zac_zbc: U32<LittleEndian>,
    label: [u8; LABEL_LEN],
    _pad1: [u8; 4],
    /// Zone number of the first data zone
    data_start: U64<LittleEndian>,
    /// Zone size in 512 byte sectors
    zone_size: U64<LittleEndian>,
}

/// Size of the on-disk structure in bytes
pub const SIZE: usize = 176;

const _: () = assert!(std::mem::size_of::<Zdm>() == SIZE);

/// Zoned disk flavour backing the volume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskType {
    HostAware,
    HostManaged,
    Unknown(u32),
}

impl From<u32> for DiskType {
    fn from(value: u32) -> Self {
        match value {
            1 => DiskType::HostAware,
            2 => DiskType::HostManaged,
            n => DiskType::Unknown(n),
        }
    }
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskType::HostAware => f.write_str("host-aware"),
            DiskType::HostManaged => f.write_str("host-managed"),
            DiskType::Unknown(n) => write!(f, "unknown ({n})"),
        }
    }
}

/// Unpacked `0xMMMMmmpt` version word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u8,
    pub patch: u8,
    pub tag: u8,
}

impl From<u32> for Version {
    fn from(raw: u32) -> Self {
        Self {
            major: (raw >> 16) as u16,
            minor: (raw >> 8) as u8,
            patch: ((raw >> 4) & 0xf) as u8,
            tag: (raw & 0xf) as u8,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.tag)
    }
}

/// Decode and verify a ZDM superblock record from the start of `bytes`
///
/// This works on the record alone and only needs [`SIZE`] bytes. Use
/// [`crate::Superblock::from_bytes`] to probe a device head, which also enforces
/// [`crate::MIN_DEVICE_SIZE`]. Unlike the probe this reports why a candidate was rejected.
pub fn from_bytes(bytes: &[u8]) -> Result<Zdm, Error> {
    let (data, _) = Zdm::read_from_prefix(bytes).map_err(|_| Error::InvalidSuperblock)?;

    if !Zdm::is_valid_magic(&data.magic) {
        return Err(Error::InvalidMagic);
    }
    data.verify()?;

    log::trace!(
        "valid ZDM superblock: UUID={} [volume label: \"{}\"]",
        data.uuid()?,
        data.label().unwrap_or_else(|_| "[invalid utf8]".into())
    );
    Ok(data)
}

impl Detection for Zdm {
    type Magic = [u8; 16];

    const OFFSET: u64 = START_POSITION;

    const MAGIC_OFFSET: u64 = START_POSITION + MAGIC_OFFSET;

    const SIZE: usize = SIZE;

    fn is_valid_magic(magic: &Self::Magic) -> bool {
        *magic == MAGIC
    }

    fn verify(&self) -> Result<(), Error> {
        let stored = self.crc32.get();
        let computed = self.compute_checksum();
        if stored == computed {
            Ok(())
        } else {
            Err(Error::InvalidChecksum { stored, computed })
        }
    }
}

impl Zdm {
    /// CRC-32 (IEEE, reflected) of the superblock with the checksum field zeroed
    pub fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[0u8; 4]);
        hasher.update(&self.as_bytes()[4..]);
        hasher.finalize()
    }

    /// Stored checksum
    pub fn checksum(&self) -> u32 {
        self.crc32.get()
    }

    /// Return the encoded UUID for this superblock
    pub fn uuid(&self) -> Result<String, Error> {
        Ok(self.uuid_raw().hyphenated().to_string())
    }

    /// The UUID exactly as stored
    pub fn uuid_raw(&self) -> Uuid {
        Uuid::from_bytes(self.uuid)
    }

    /// Return the volume label as valid utf8, without the NUL padding
    pub fn label(&self) -> Result<String, Error> {
        let end = self.label.iter().position(|&b| b == 0).unwrap_or(LABEL_LEN);
        Ok(std::str::from_utf8(&self.label[..end])?.to_owned())
    }

    pub fn version(&self) -> Version {
        Version::from(self.version.get())
    }

    pub fn sector_start(&self) -> u64 {
        self.sect_start.get()
    }

    pub fn sector_size(&self) -> u64 {
        self.sect_size.get()
    }

    pub fn metadata_zone_count(&self) -> u32 {
        self.mz_metadata_zones.get()
    }

    pub fn over_provision_zone_count(&self) -> u32 {
        self.mz_over_provision.get()
    }

    pub fn mapped_block_count(&self) -> u64 {
        self.zdm_blocks.get()
    }

    pub fn discard_enabled(&self) -> bool {
        self.discard.get() != 0
    }

    pub fn disk_type(&self) -> DiskType {
        DiskType::from(self.disk_type.get())
    }

    pub fn zac_zbc_supported(&self) -> bool {
        self.zac_zbc.get() != 0
    }

    pub fn data_start_zone(&self) -> u64 {
        self.data_start.get()
    }

    pub fn zone_size_sectors(&self) -> u64 {
        self.zone_size.get()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{detect_superblock, MIN_DEVICE_SIZE};
    use std::io::Cursor;

    pub(crate) const SAMPLE_UUID: [u8; 16] = [
        0x5f, 0x0c, 0x2b, 0x9e, 0x13, 0xa4, 0x4d, 0x6e, 0x8a, 0x1b, 0xc2, 0xd3, 0xe4, 0xf5, 0x06, 0x17,
    ];

    fn put(block: &mut [u8], offset: usize, bytes: &[u8]) {
        block[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn seal(block: &mut [u8]) {
        block[0..4].fill(0);
        let crc = crc32fast::hash(&block[..SIZE]);
        put(block, 0, &crc.to_le_bytes());
    }

    /// A 4 KiB device head carrying a sealed ZDM superblock
    pub(crate) fn sample_block() -> Vec<u8> {
        let mut block = vec![0u8; MIN_DEVICE_SIZE];
        put(&mut block, 8, &MAGIC);
        put(&mut block, 24, &SAMPLE_UUID);
        put(&mut block, 40, &0x0001_0203u32.to_le_bytes());
        put(&mut block, 48, &0u64.to_le_bytes());
        put(&mut block, 56, &0x1d1c_0000u64.to_le_bytes());
        put(&mut block, 64, &3u32.to_le_bytes());
        put(&mut block, 68, &5u32.to_le_bytes());
        put(&mut block, 72, &0x0380_0000u64.to_le_bytes());
        put(&mut block, 80, &1u32.to_le_bytes());
        put(&mut block, 84, &2u32.to_le_bytes());
        put(&mut block, 88, &1u32.to_le_bytes());
        put(&mut block, 92, b"zoned scratch");
        put(&mut block, 160, &8u64.to_le_bytes());
        put(&mut block, 168, &0x8_0000u64.to_le_bytes());
        // Bytes past the structure are not covered by the checksum
        block[SIZE + 10] = 0xee;
        seal(&mut block);
        block
    }

    #[test]
    fn test_crc_is_ieee() {
        assert_eq!(crc32fast::hash(b"123456789"), 0xCBF4_3926);
    }

    #[test_log::test]
    fn test_basic() {
        let block = sample_block();
        let sb = from_bytes(&block).expect("Cannot parse superblock");
        assert_eq!(sb.uuid_raw().as_bytes(), &SAMPLE_UUID);
        assert_eq!(sb.uuid().unwrap(), "5f0c2b9e-13a4-4d6e-8a1b-c2d3e4f50617");
        assert_eq!(sb.label().unwrap(), "zoned scratch");
        assert_eq!(
            sb.version(),
            Version {
                major: 1,
                minor: 2,
                patch: 0,
                tag: 3
            }
        );
        assert_eq!(sb.version().to_string(), "1.2.0.3");
        assert_eq!(sb.sector_start(), 0);
        assert_eq!(sb.sector_size(), 0x1d1c_0000);
        assert_eq!(sb.metadata_zone_count(), 3);
        assert_eq!(sb.over_provision_zone_count(), 5);
        assert_eq!(sb.mapped_block_count(), 0x0380_0000);
        assert!(sb.discard_enabled());
        assert_eq!(sb.disk_type(), DiskType::HostManaged);
        assert!(sb.zac_zbc_supported());
        assert_eq!(sb.data_start_zone(), 8);
        assert_eq!(sb.zone_size_sectors(), 0x8_0000);
        assert_eq!(sb.checksum(), sb.compute_checksum());
    }

    #[test_log::test]
    fn test_corrupt_payload() {
        for offset in [4, 30, 100, SIZE - 1] {
            let mut block = sample_block();
            block[offset] ^= 0x40;
            let err = from_bytes(&block).unwrap_err();
            assert!(matches!(err, Error::InvalidChecksum { .. }), "offset {offset}: {err}");
            assert!(err.is_integrity());
        }
    }

    #[test_log::test]
    fn test_corrupt_checksum() {
        let mut block = sample_block();
        block[2] ^= 0xff;
        assert!(matches!(from_bytes(&block), Err(Error::InvalidChecksum { .. })));

        let mut cursor = Cursor::new(&block);
        assert!(detect_superblock::<Zdm, _>(&mut cursor).unwrap().is_none());
    }

    #[test_log::test]
    fn test_bad_magic() {
        let mut block = sample_block();
        block[8] = b'Z';
        seal(&mut block);
        assert!(matches!(from_bytes(&block), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_truncated() {
        let block = sample_block();
        assert!(matches!(from_bytes(&block[..SIZE - 1]), Err(Error::InvalidSuperblock)));
    }

    #[test]
    fn test_disk_type() {
        assert_eq!(DiskType::from(1), DiskType::HostAware);
        assert_eq!(DiskType::from(7), DiskType::Unknown(7));
        assert_eq!(DiskType::HostManaged.to_string(), "host-managed");
    }
}
