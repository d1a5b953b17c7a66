//! ELF64 file header parsing and serialization.
//!
//! The header is decoded field by field from a seekable stream. It is the
//! only structure this crate can also write back out, since the entry point
//! is patched in place by callers.

use std::io::{Read, Seek};

use crate::error::{ElfError, Malformed, Table};
use crate::read::FieldReader;

/// ELF magic bytes: `\x7fELF`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF class: 64-bit.
pub const ELFCLASS64: u8 = 2;

/// ELF data encoding: little-endian.
pub const ELFDATA2LSB: u8 = 1;

/// ELF type: executable.
pub const ET_EXEC: u16 = 2;

/// ELF type: shared object (PIE).
pub const ET_DYN: u16 = 3;

/// ELF machine: x86-64.
pub const EM_X86_64: u16 = 62;

/// Size of an ELF64 file header (64 bytes).
pub const ELF64_EHDR_SIZE: usize = 64;

/// Size of an ELF64 program header entry (56 bytes).
pub const ELF64_PHDR_SIZE: usize = 56;

/// Size of an ELF64 section header entry (64 bytes).
pub const ELF64_SHDR_SIZE: usize = 64;

/// File offset of `e_entry` within the ELF64 header.
pub const ENTRY_FIELD_OFFSET: u64 = 24;

const CLASS_OFFSET: u64 = 4;
const DATA_OFFSET: u64 = 5;
const PHENTSIZE_OFFSET: u64 = 54;
const SHENTSIZE_OFFSET: u64 = 58;

/// Parsed ELF64 file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    /// Identification bytes (magic, class, encoding, version, ABI, padding).
    pub e_ident: [u8; 16],
    /// Object file type.
    pub e_type: u16,
    /// Target machine architecture.
    pub e_machine: u16,
    /// Object file version.
    pub e_version: u32,
    /// Virtual address of the entry point.
    pub e_entry: u64,
    /// Offset of the program header table in the file.
    pub e_phoff: u64,
    /// Offset of the section header table in the file.
    pub e_shoff: u64,
    /// Processor-specific flags.
    pub e_flags: u32,
    /// Size of this header.
    pub e_ehsize: u16,
    /// Size of each program header entry.
    pub e_phentsize: u16,
    /// Number of program header entries.
    pub e_phnum: u16,
    /// Size of each section header entry.
    pub e_shentsize: u16,
    /// Number of section header entries.
    pub e_shnum: u16,
    /// Section header string table index.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Read an ELF64 file header from the start of `reader`.
    ///
    /// Validates the magic, class, and encoding, and that any non-empty
    /// table declares the ELF64 record size. The machine type is not
    /// checked here.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::MalformedHeader`] on a short read or a rejected
    /// field, with the offset of that field.
    pub fn read<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Self, ElfError> {
        let mut r = FieldReader::at(reader, 0)?;

        let e_ident: [u8; 16] = r.bytes()?;
        if e_ident[..4] != ELF_MAGIC {
            return Err(malformed(0, Malformed::BadMagic));
        }
        if e_ident[4] != ELFCLASS64 {
            return Err(malformed(
                CLASS_OFFSET,
                Malformed::UnsupportedClass(e_ident[4]),
            ));
        }
        if e_ident[5] != ELFDATA2LSB {
            return Err(malformed(
                DATA_OFFSET,
                Malformed::UnsupportedEncoding(e_ident[5]),
            ));
        }

        let hdr = Self {
            e_ident,
            e_type: r.u16()?,
            e_machine: r.u16()?,
            e_version: r.u32()?,
            e_entry: r.u64()?,
            e_phoff: r.u64()?,
            e_shoff: r.u64()?,
            e_flags: r.u32()?,
            e_ehsize: r.u16()?,
            e_phentsize: r.u16()?,
            e_phnum: r.u16()?,
            e_shentsize: r.u16()?,
            e_shnum: r.u16()?,
            e_shstrndx: r.u16()?,
        };

        if hdr.e_phnum > 0 && usize::from(hdr.e_phentsize) != ELF64_PHDR_SIZE {
            return Err(malformed(
                PHENTSIZE_OFFSET,
                Malformed::EntrySize {
                    table: Table::ProgramHeaders,
                    expected: ELF64_PHDR_SIZE as u16,
                    found: hdr.e_phentsize,
                },
            ));
        }
        if hdr.e_shnum > 0 && usize::from(hdr.e_shentsize) != ELF64_SHDR_SIZE {
            return Err(malformed(
                SHENTSIZE_OFFSET,
                Malformed::EntrySize {
                    table: Table::SectionHeaders,
                    expected: ELF64_SHDR_SIZE as u16,
                    found: hdr.e_shentsize,
                },
            ));
        }

        Ok(hdr)
    }

    /// Check that both header tables lie within a file of `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::MalformedHeader`] pointing at the table's start
    /// if it overflows or extends past `len`.
    pub fn check_tables(&self, len: u64) -> Result<(), ElfError> {
        check_table(
            Table::ProgramHeaders,
            self.e_phoff,
            self.e_phnum,
            self.e_phentsize,
            len,
        )?;
        check_table(
            Table::SectionHeaders,
            self.e_shoff,
            self.e_shnum,
            self.e_shentsize,
            len,
        )
    }

    /// File offset of the program header record at `index`.
    #[must_use]
    pub fn program_header_offset(&self, index: usize) -> u64 {
        self.e_phoff + index as u64 * u64::from(self.e_phentsize)
    }

    /// File offset of the section header record at `index`.
    #[must_use]
    pub fn section_header_offset(&self, index: usize) -> u64 {
        self.e_shoff + index as u64 * u64::from(self.e_shentsize)
    }

    /// Serialize the header into its 64-byte on-disk form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ELF64_EHDR_SIZE] {
        let mut b = [0u8; ELF64_EHDR_SIZE];
        b[0..16].copy_from_slice(&self.e_ident);
        b[16..18].copy_from_slice(&self.e_type.to_le_bytes());
        b[18..20].copy_from_slice(&self.e_machine.to_le_bytes());
        b[20..24].copy_from_slice(&self.e_version.to_le_bytes());
        b[24..32].copy_from_slice(&self.e_entry.to_le_bytes());
        b[32..40].copy_from_slice(&self.e_phoff.to_le_bytes());
        b[40..48].copy_from_slice(&self.e_shoff.to_le_bytes());
        b[48..52].copy_from_slice(&self.e_flags.to_le_bytes());
        b[52..54].copy_from_slice(&self.e_ehsize.to_le_bytes());
        b[54..56].copy_from_slice(&self.e_phentsize.to_le_bytes());
        b[56..58].copy_from_slice(&self.e_phnum.to_le_bytes());
        b[58..60].copy_from_slice(&self.e_shentsize.to_le_bytes());
        b[60..62].copy_from_slice(&self.e_shnum.to_le_bytes());
        b[62..64].copy_from_slice(&self.e_shstrndx.to_le_bytes());
        b
    }
}

fn malformed(offset: u64, reason: Malformed) -> ElfError {
    ElfError::MalformedHeader { offset, reason }
}

fn check_table(table: Table, off: u64, num: u16, entsize: u16, len: u64) -> Result<(), ElfError> {
    if num == 0 {
        return Ok(());
    }
    let end = u64::from(num)
        .checked_mul(u64::from(entsize))
        .and_then(|size| off.checked_add(size))
        .unwrap_or(u64::MAX);
    if end > len {
        return Err(malformed(off, Malformed::OutOfBounds { table, end, len }));
    }
    Ok(())
}
