//! Error types for cave search and injection.

use std::fmt;
use std::io;

use elfcave_elf::ElfError;

/// Errors that can occur while locating a cave or patching a file.
#[derive(Debug)]
pub enum PatchError {
    /// The file could not be parsed.
    Elf(ElfError),
    /// The file has no `PT_LOAD` segment to inject into.
    NoLoadSegment,
    /// No verified cave is larger than the code to be written.
    NoCaveFound {
        /// Bytes of code that needed a home.
        needed: u64,
    },
    /// The requested segment exists but holds no large-enough cave.
    NotACave {
        /// Program header index that was requested.
        segment: usize,
        /// Bytes of code that needed a home.
        needed: u64,
    },
    /// The program header record layout for this machine is not known.
    UnsupportedMachine(u16),
    /// Reading or writing the file failed.
    Io {
        /// File offset being accessed.
        offset: u64,
        /// The I/O error.
        source: io::Error,
    },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elf(e) => write!(f, "{e}"),
            Self::NoLoadSegment => write!(f, "no PT_LOAD segment in the program"),
            Self::NoCaveFound { needed } => {
                write!(f, "no cave larger than {needed} bytes in the program")
            }
            Self::NotACave { segment, needed } => write!(
                f,
                "segment {segment} has no verified cave larger than {needed} bytes"
            ),
            Self::UnsupportedMachine(machine) => {
                write!(f, "unsupported machine type {machine}")
            }
            Self::Io { offset, source } => write!(f, "I/O error at {offset:#x}: {source}"),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Elf(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ElfError> for PatchError {
    fn from(e: ElfError) -> Self {
        Self::Elf(e)
    }
}
