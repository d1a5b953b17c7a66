//! Offset-tracked little-endian field reads over a seekable stream.
//!
//! Every structure in this crate is decoded through [`FieldReader`], which
//! reads each field at its exact width and remembers where it is so that a
//! short read can be reported with the offset that was attempted.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{ElfError, Malformed};

/// Sequential field reader positioned at a known file offset.
pub(crate) struct FieldReader<'r, R: ?Sized> {
    inner: &'r mut R,
    pos: u64,
}

impl<'r, R: Read + Seek + ?Sized> FieldReader<'r, R> {
    /// Seek `inner` to `pos` and start reading fields from there.
    pub(crate) fn at(inner: &'r mut R, pos: u64) -> Result<Self, ElfError> {
        inner
            .seek(SeekFrom::Start(pos))
            .map_err(|source| ElfError::Io { offset: pos, source })?;
        Ok(Self { inner, pos })
    }

    /// Read exactly `N` bytes.
    pub(crate) fn bytes<const N: usize>(&mut self) -> Result<[u8; N], ElfError> {
        let mut buf = [0u8; N];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {
                self.pos += N as u64;
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ElfError::MalformedHeader {
                offset: self.pos,
                reason: Malformed::ShortRead { needed: N },
            }),
            Err(source) => Err(ElfError::Io {
                offset: self.pos,
                source,
            }),
        }
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ElfError> {
        self.bytes().map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ElfError> {
        self.bytes().map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> Result<u64, ElfError> {
        self.bytes().map(u64::from_le_bytes)
    }
}

/// Length of the stream in bytes. Leaves the position at the end.
pub(crate) fn stream_len<R: Seek + ?Sized>(inner: &mut R) -> Result<u64, ElfError> {
    inner
        .seek(SeekFrom::End(0))
        .map_err(|source| ElfError::Io { offset: 0, source })
}

/// Read up to `len` bytes at `offset`, stopping early at end of file.
pub(crate) fn read_region<R: Read + Seek + ?Sized>(
    inner: &mut R,
    offset: u64,
    len: u64,
) -> Result<Vec<u8>, ElfError> {
    inner
        .seek(SeekFrom::Start(offset))
        .map_err(|source| ElfError::Io { offset, source })?;
    let mut buf = Vec::new();
    inner
        .take(len)
        .read_to_end(&mut buf)
        .map_err(|source| ElfError::Io { offset, source })?;
    Ok(buf)
}
