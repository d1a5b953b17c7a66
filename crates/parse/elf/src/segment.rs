//! ELF64 program header (segment) records.

use std::io::{Read, Seek};

use crate::error::ElfError;
use crate::read::FieldReader;

/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;

/// Program header type: auxiliary note.
pub const PT_NOTE: u32 = 4;

/// Segment flag: executable.
pub const PF_X: u32 = 0x1;

/// Segment flag: writable.
pub const PF_W: u32 = 0x2;

/// Segment flag: readable.
pub const PF_R: u32 = 0x4;

/// Byte offset of `p_filesz` within an ELF64 program header record.
///
/// `p_memsz` follows immediately after it.
pub const PHDR_FILESZ_OFFSET: u64 = 32;

/// A parsed ELF64 program header entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Segment type (`PT_LOAD`, ...).
    pub p_type: u32,
    /// Segment permission flags (`PF_R = 4`, `PF_W = 2`, `PF_X = 1`).
    pub p_flags: u32,
    /// Offset of the segment data in the file.
    pub p_offset: u64,
    /// Virtual address of the segment.
    pub p_vaddr: u64,
    /// Physical address (unused on the targets handled here).
    pub p_paddr: u64,
    /// Size of the segment data in the file.
    pub p_filesz: u64,
    /// Size of the segment in memory.
    pub p_memsz: u64,
    /// Required alignment.
    pub p_align: u64,
}

impl Segment {
    /// Read one program header record at file offset `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::MalformedHeader`] if the record is cut short.
    pub fn read_at<R: Read + Seek + ?Sized>(reader: &mut R, offset: u64) -> Result<Self, ElfError> {
        let mut r = FieldReader::at(reader, offset)?;
        Ok(Self {
            p_type: r.u32()?,
            p_flags: r.u32()?,
            p_offset: r.u64()?,
            p_vaddr: r.u64()?,
            p_paddr: r.u64()?,
            p_filesz: r.u64()?,
            p_memsz: r.u64()?,
            p_align: r.u64()?,
        })
    }

    /// Returns `true` for `PT_LOAD` segments.
    #[must_use]
    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }

    /// Returns `true` if the segment is mapped executable.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.p_flags & PF_X != 0
    }

    /// File offset one past the last byte backed by the file.
    #[must_use]
    pub fn file_end(&self) -> u64 {
        self.p_offset.saturating_add(self.p_filesz)
    }

    /// Virtual address one past the last file-backed byte.
    #[must_use]
    pub fn file_backed_vend(&self) -> u64 {
        self.p_vaddr.saturating_add(self.p_filesz)
    }

    /// Returns `true` if `[addr, addr + size)` lies within `[vaddr, vaddr + memsz)`.
    #[must_use]
    pub fn contains_range(&self, addr: u64, size: u64) -> bool {
        let Some(end) = addr.checked_add(size) else {
            return false;
        };
        addr >= self.p_vaddr && end <= self.p_vaddr.saturating_add(self.p_memsz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElfBuilder;
    use std::io::Cursor;

    #[test]
    fn read_record_fields() {
        let seg = Segment {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_X,
            p_offset: 0x1000,
            p_vaddr: 0x40_1000,
            p_paddr: 0x40_1000,
            p_filesz: 0x123,
            p_memsz: 0x2000,
            p_align: 0x1000,
        };
        let buf = ElfBuilder::new().segment(seg).build();
        let parsed = Segment::read_at(&mut Cursor::new(buf), 64).expect("full record");
        assert_eq!(parsed, seg);
        assert!(parsed.is_load());
        assert!(parsed.is_executable());
        assert_eq!(parsed.file_end(), 0x1123);
        assert_eq!(parsed.file_backed_vend(), 0x40_1123);
    }

    #[test]
    fn truncated_record_is_malformed() {
        let buf = ElfBuilder::new().load(PF_R, 0, 0, 0, 0).build();
        let short = buf[..64 + 40].to_vec();
        let err = Segment::read_at(&mut Cursor::new(short), 64).unwrap_err();
        // p_memsz is the first field that does not fit.
        assert_eq!(err.offset(), Some(64 + 40));
    }

    #[test]
    fn containment_is_half_open() {
        let seg = Segment {
            p_type: PT_LOAD,
            p_flags: PF_R,
            p_offset: 0,
            p_vaddr: 0x1000,
            p_paddr: 0,
            p_filesz: 0x100,
            p_memsz: 0x1000,
            p_align: 0x1000,
        };
        assert!(seg.contains_range(0x1000, 0x1000));
        assert!(seg.contains_range(0x1800, 0));
        assert!(!seg.contains_range(0x0fff, 2));
        assert!(!seg.contains_range(0x1800, 0x801));
        assert!(!seg.contains_range(u64::MAX, 2));
    }

    #[test]
    fn flags() {
        let seg = Segment {
            p_type: PT_NOTE,
            p_flags: PF_R | PF_W,
            p_offset: 0,
            p_vaddr: 0,
            p_paddr: 0,
            p_filesz: 0,
            p_memsz: 0,
            p_align: 0,
        };
        assert!(!seg.is_load());
        assert!(!seg.is_executable());
    }
}
