//! ELF64 section header records and section-name string tables.

use std::io::{Read, Seek};

use crate::error::{ElfError, StringTableError};
use crate::read::FieldReader;

/// Section type: inactive.
pub const SHT_NULL: u32 = 0;

/// Section type: program-defined contents.
pub const SHT_PROGBITS: u32 = 1;

/// Section type: symbol table.
pub const SHT_SYMTAB: u32 = 2;

/// Section type: string table.
pub const SHT_STRTAB: u32 = 3;

/// Section type: occupies no file space (`.bss`).
pub const SHT_NOBITS: u32 = 8;

/// Section flag: writable data.
pub const SHF_WRITE: u64 = 0x1;

/// Section flag: occupies memory during execution.
pub const SHF_ALLOC: u64 = 0x2;

/// Section flag: executable machine instructions.
pub const SHF_EXECINSTR: u64 = 0x4;

/// Special section index: undefined.
pub const SHN_UNDEF: u16 = 0;

/// A parsed ELF64 section header entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Offset into the section header string table for this section's name.
    pub sh_name: u32,
    /// Section type (`SHT_SYMTAB`, `SHT_STRTAB`, etc.).
    pub sh_type: u32,
    /// Section flags.
    pub sh_flags: u64,
    /// Virtual address of the section in memory (0 for non-loaded sections).
    pub sh_addr: u64,
    /// File offset of the section data.
    pub sh_offset: u64,
    /// Size of the section data in bytes.
    pub sh_size: u64,
    /// Associated section index.
    pub sh_link: u32,
    /// Extra info (interpretation depends on section type).
    pub sh_info: u32,
    /// Required alignment of the section.
    pub sh_addralign: u64,
    /// Size of each entry (for sections with fixed-size entries).
    pub sh_entsize: u64,
    /// Name resolved through the section header string table.
    ///
    /// `None` until names are resolved, or if resolution failed.
    pub name: Option<String>,
}

impl Section {
    /// Read one section header record at file offset `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::MalformedHeader`] if the record is cut short.
    pub fn read_at<R: Read + Seek + ?Sized>(reader: &mut R, offset: u64) -> Result<Self, ElfError> {
        let mut r = FieldReader::at(reader, offset)?;
        Ok(Self {
            sh_name: r.u32()?,
            sh_type: r.u32()?,
            sh_flags: r.u64()?,
            sh_addr: r.u64()?,
            sh_offset: r.u64()?,
            sh_size: r.u64()?,
            sh_link: r.u32()?,
            sh_info: r.u32()?,
            sh_addralign: r.u64()?,
            sh_entsize: r.u64()?,
            name: None,
        })
    }

    /// Returns the resolved name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Owned string table bytes.
///
/// [`ElfImage`](crate::ElfImage) fills this from the table's start to end of
/// file, so a name is bounded by its NUL and not by `sh_size`.
#[derive(Debug, Clone)]
pub struct StringTable {
    data: Vec<u8>,
}

impl StringTable {
    /// Creates a new string table from the raw section data.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Looks up the string starting at byte `offset`, up to the first zero byte.
    ///
    /// Bytes that are not valid UTF-8 are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StringTableError::NameOutOfRange`] if `offset` is past the
    /// table, or [`StringTableError::Unterminated`] if no zero byte follows.
    pub fn get(&self, offset: u32) -> Result<String, StringTableError> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(StringTableError::NameOutOfRange {
                name: offset,
                size: self.data.len() as u64,
            });
        }
        let remaining = &self.data[start..];
        let nul_pos = remaining
            .iter()
            .position(|&b| b == 0)
            .ok_or(StringTableError::Unterminated { name: offset })?;
        Ok(String::from_utf8_lossy(&remaining[..nul_pos]).into_owned())
    }

    /// Size of the table in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the table holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
