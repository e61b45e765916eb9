// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Superblock detection and handling for zoned block device formats
//!
//! This module provides functionality to detect and read the on-disk superblock
//! of a ZDM (zoned device mapper) volume. Detection is two staged: the magic
//! signature must match at its fixed offset, and the superblock must then pass
//! its own integrity check before anything is trusted.

use std::io::{self, Cursor, Read, Seek};

use thiserror::Error;
use zerocopy::FromBytes;

pub mod zdm;

/// Smallest device that can carry any supported superblock
pub const MIN_DEVICE_SIZE: usize = 4096;

/// Common interface for superblock detection
pub trait Detection: Sized + FromBytes {
    /// The magic number type for this superblock
    type Magic: FromBytes + PartialEq + Eq;

    /// The offset in bytes where the superblock is located
    const OFFSET: u64;

    /// The offset within the superblock where the magic number is located
    const MAGIC_OFFSET: u64;

    /// The size in bytes of the superblock
    const SIZE: usize;

    /// Check if the magic number is valid for this superblock type
    fn is_valid_magic(magic: &Self::Magic) -> bool;

    /// Integrity gate run after the magic matched. Formats without a checksum accept everything.
    fn verify(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Errors that can occur when reading superblocks
#[derive(Debug, Error)]
pub enum Error {
    /// No known filesystem superblock was detected
    #[error("unknown superblock")]
    UnknownSuperblock,

    /// The magic signature did not match
    #[error("invalid magic")]
    InvalidMagic,

    /// The stored checksum does not match the recomputed one
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    InvalidChecksum { stored: u32, computed: u32 },

    /// The superblock could not be decoded from the supplied bytes
    #[error("invalid superblock")]
    InvalidSuperblock,

    /// Error decoding UTF-8 string data
    #[error("invalid utf8 in decode: {0}")]
    Utf8Decoding(#[from] std::str::Utf8Error),

    /// An I/O error occurred
    #[error("io: {0}")]
    IO(#[from] io::Error),
}

impl Error {
    /// True when the error only means "not this format", so callers can move on to another probe
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::UnknownSuperblock | Error::InvalidMagic | Error::InvalidChecksum { .. } | Error::InvalidSuperblock
        )
    }
}

/// Attempts to detect a superblock of the given type from the reader
///
/// Returns `Ok(None)` when the magic is absent, the input is too short, or the
/// integrity check fails. Only genuine I/O failures are errors.
pub fn detect_superblock<T: Detection, R: Read + Seek>(reader: &mut R) -> Result<Option<T>, Error> {
    reader.seek(io::SeekFrom::Start(T::MAGIC_OFFSET))?;
    let mut magic_buf = vec![0u8; std::mem::size_of::<T::Magic>()];
    if !read_or_eof(reader, &mut magic_buf)? {
        return Ok(None);
    }

    match T::Magic::read_from_bytes(&magic_buf) {
        Ok(magic) if T::is_valid_magic(&magic) => {
            reader.seek(io::SeekFrom::Start(T::OFFSET))?;
            let mut block_buf = vec![0u8; T::SIZE];
            if !read_or_eof(reader, &mut block_buf)? {
                return Ok(None);
            }
            let Ok(block) = T::read_from_bytes(&block_buf) else {
                return Ok(None);
            };
            match block.verify() {
                Ok(()) => Ok(Some(block)),
                Err(e) if e.is_integrity() => {
                    log::debug!("magic matched but superblock rejected: {e}");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
        _ => Ok(None),
    }
}

// Short reads mean the candidate is too small to hold the structure.
fn read_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, Error> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Supported formats that can be detected and read
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// ZDM zoned device mapper volume
    Zdm,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Kind::Zdm => f.write_str("zdm"),
        }
    }
}

#[derive(Debug)]
pub enum Superblock {
    Zdm(Box<zdm::Zdm>),
}

impl Superblock {
    /// Returns the format of this superblock
    pub fn kind(&self) -> Kind {
        match self {
            Superblock::Zdm(_) => Kind::Zdm,
        }
    }

    /// Returns the volume UUID
    pub fn uuid(&self) -> Result<String, Error> {
        match self {
            Superblock::Zdm(block) => block.uuid(),
        }
    }

    /// Returns the volume label if available
    pub fn label(&self) -> Result<String, Error> {
        match self {
            Superblock::Zdm(block) => block.label(),
        }
    }
}

impl Superblock {
    /// Attempt to detect and read a superblock from raw bytes
    ///
    /// `bytes` is the head of a device; anything shorter than [`MIN_DEVICE_SIZE`] cannot carry a superblock.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < MIN_DEVICE_SIZE {
            log::debug!("{} bytes is too small for any superblock", bytes.len());
            return Err(Error::UnknownSuperblock);
        }
        let mut cursor = Cursor::new(bytes);

        if let Some(sb) = detect_superblock::<zdm::Zdm, _>(&mut cursor)? {
            return Ok(Self::Zdm(Box::new(sb)));
        }

        Err(Error::UnknownSuperblock)
    }

    /// Attempt to detect and read a superblock from a reader
    ///
    /// Only the first [`MIN_DEVICE_SIZE`] bytes are read; a shorter device cannot carry a superblock.
    pub fn from_reader<R: Read + Seek>(reader: &mut R) -> Result<Self, Error> {
        let mut bytes = vec![0u8; MIN_DEVICE_SIZE];
        reader.rewind()?;
        if !read_or_eof(reader, &mut bytes)? {
            return Err(Error::UnknownSuperblock);
        }

        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::{zdm, zdm::tests::sample_block, Error, Kind, Superblock, MIN_DEVICE_SIZE};

    #[test_log::test]
    fn test_determination() {
        let block = sample_block();
        let mut cursor = Cursor::new(&block);
        let sb = Superblock::from_reader(&mut cursor).expect("Failed to find right block implementation");
        eprintln!("sample: superblock matched to {}", sb.kind());
        assert_eq!(sb.kind(), Kind::Zdm);
        assert_eq!(sb.label().unwrap(), "zoned scratch");
        assert_eq!(sb.uuid().unwrap(), "5f0c2b9e-13a4-4d6e-8a1b-c2d3e4f50617");
    }

    #[test_log::test]
    fn test_empty_device() {
        let block = vec![0u8; MIN_DEVICE_SIZE];
        let err = Superblock::from_bytes(&block).unwrap_err();
        assert!(matches!(err, Error::UnknownSuperblock));
        assert!(err.is_integrity());
    }

    #[test_log::test]
    fn test_short_device() {
        let block = sample_block();
        let mut cursor = Cursor::new(&block[..1024]);
        let err = Superblock::from_reader(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::UnknownSuperblock));
    }

    #[test_log::test]
    fn test_bare_record_is_not_found() {
        let block = sample_block();
        let err = Superblock::from_bytes(&block[..zdm::SIZE]).unwrap_err();
        assert!(matches!(err, Error::UnknownSuperblock));
        assert!(Superblock::from_bytes(&block[..MIN_DEVICE_SIZE - 1]).is_err());
        assert!(Superblock::from_bytes(&block[..MIN_DEVICE_SIZE]).is_ok());
    }

    #[test_log::test]
    fn test_corrupt_block_is_not_found() {
        let mut block = sample_block();
        block[100] ^= 0x01;
        assert!(matches!(Superblock::from_bytes(&block), Err(Error::UnknownSuperblock)));
    }
}
