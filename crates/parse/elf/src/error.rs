//! Error types for ELF structural parsing.

use std::fmt;
use std::io;

/// Which header table a structural error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// The program header (segment) table.
    ProgramHeaders,
    /// The section header table.
    SectionHeaders,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramHeaders => write!(f, "program header table"),
            Self::SectionHeaders => write!(f, "section header table"),
        }
    }
}

/// Why a header field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// Fewer bytes were available than the field requires.
    ShortRead {
        /// Width of the field that could not be read.
        needed: usize,
    },
    /// The file does not start with `\x7fELF`.
    BadMagic,
    /// The ELF class is not `ELFCLASS64`.
    UnsupportedClass(u8),
    /// The data encoding is not little-endian.
    UnsupportedEncoding(u8),
    /// A table's declared entry size does not match the ELF64 record size.
    EntrySize {
        /// Table whose entry size is wrong.
        table: Table,
        /// Record size required for ELF64.
        expected: u16,
        /// Entry size declared in the header.
        found: u16,
    },
    /// A table extends past the end of the file.
    OutOfBounds {
        /// Table that does not fit.
        table: Table,
        /// One past the last byte the table would occupy.
        end: u64,
        /// Length of the file.
        len: u64,
    },
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortRead { needed } => write!(f, "short read ({needed} bytes required)"),
            Self::BadMagic => write!(f, "invalid ELF magic bytes"),
            Self::UnsupportedClass(class) => {
                write!(f, "unsupported ELF class {class} (expected ELFCLASS64)")
            }
            Self::UnsupportedEncoding(data) => {
                write!(f, "unsupported data encoding {data} (expected little-endian)")
            }
            Self::EntrySize {
                table,
                expected,
                found,
            } => write!(f, "{table} entry size is {found}, expected {expected}"),
            Self::OutOfBounds { table, end, len } => {
                write!(f, "{table} ends at {end:#x}, past end of file ({len:#x})")
            }
        }
    }
}

/// Section-name resolution failures.
///
/// These never invalidate the header or segment data; an [`ElfImage`]
/// keeps the error and leaves every section name unresolved.
///
/// [`ElfImage`]: crate::ElfImage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringTableError {
    /// `e_shstrndx` is `SHN_UNDEF`: the file declares no name table.
    Undefined,
    /// `e_shstrndx` does not index an existing section.
    IndexOutOfRange {
        /// Declared string table index.
        index: u16,
        /// Number of sections in the file.
        count: u16,
    },
    /// A name offset points past the end of the file.
    NameOutOfRange {
        /// The offending `sh_name` value.
        name: u32,
        /// Bytes available from the string table's start to end of file.
        size: u64,
    },
    /// A name runs to the end of the file without a terminating zero byte.
    Unterminated {
        /// The offending `sh_name` value.
        name: u32,
    },
}

impl fmt::Display for StringTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "no section name string table (SHN_UNDEF)"),
            Self::IndexOutOfRange { index, count } => write!(
                f,
                "string table index {index} out of range ({count} sections)"
            ),
            Self::NameOutOfRange { name, size } => write!(
                f,
                "name offset {name:#x} past end of file ({size:#x} bytes of string table)"
            ),
            Self::Unterminated { name } => {
                write!(f, "name at offset {name:#x} is not NUL-terminated")
            }
        }
    }
}

impl std::error::Error for StringTableError {}

/// Errors that can occur when parsing an ELF file.
#[derive(Debug)]
pub enum ElfError {
    /// A fixed-width field could not be read or failed validation.
    MalformedHeader {
        /// File offset at which the field was attempted.
        offset: u64,
        /// What was wrong with it.
        reason: Malformed,
    },
    /// Section names could not be resolved.
    StringTable(StringTableError),
    /// The underlying stream failed for a reason other than running out of bytes.
    Io {
        /// File offset being accessed.
        offset: u64,
        /// The I/O error.
        source: io::Error,
    },
}

impl ElfError {
    /// Returns the file offset the error is attributed to, if any.
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::MalformedHeader { offset, .. } | Self::Io { offset, .. } => Some(*offset),
            Self::StringTable(_) => None,
        }
    }
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader { offset, reason } => {
                write!(f, "malformed header at {offset:#x}: {reason}")
            }
            Self::StringTable(e) => write!(f, "string table error: {e}"),
            Self::Io { offset, source } => write!(f, "I/O error at {offset:#x}: {source}"),
        }
    }
}

impl std::error::Error for ElfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StringTable(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::MalformedHeader { .. } => None,
        }
    }
}

impl From<StringTableError> for ElfError {
    fn from(e: StringTableError) -> Self {
        Self::StringTable(e)
    }
}
