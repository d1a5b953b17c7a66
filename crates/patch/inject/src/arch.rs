//! Per-machine patching parameters.
//!
//! Each supported `e_machine` value maps to the byte offset of the
//! `p_filesz`/`p_memsz` pair inside a program header record and to the
//! preamble generator for that instruction set. Machines not in the table
//! are refused rather than patched at a guessed offset.

use elfcave_elf::{EM_X86_64, PHDR_FILESZ_OFFSET};

use crate::error::PatchError;
use crate::stub::{self, Trampoline};

/// Patching parameters for one machine type.
#[derive(Debug)]
pub struct Arch {
    /// `e_machine` value.
    pub machine: u16,
    /// Human-readable name.
    pub name: &'static str,
    /// Offset of `p_filesz` within a program header record; `p_memsz`
    /// follows it directly.
    pub size_field_offset: u64,
    preamble: fn(u64) -> Vec<u8>,
}

static ARCHES: &[Arch] = &[Arch {
    machine: EM_X86_64,
    name: "x86-64",
    size_field_offset: PHDR_FILESZ_OFFSET,
    preamble: stub::x86_64_preamble,
}];

/// Look up the parameters for `machine`.
///
/// # Errors
///
/// Returns [`PatchError::UnsupportedMachine`] for machines not in the table.
pub fn lookup(machine: u16) -> Result<&'static Arch, PatchError> {
    ARCHES
        .iter()
        .find(|a| a.machine == machine)
        .ok_or(PatchError::UnsupportedMachine(machine))
}

/// All machines that can be patched.
#[must_use]
pub fn supported() -> &'static [Arch] {
    ARCHES
}

impl Arch {
    /// Build the trampoline that runs `payload` and resumes at `entry`.
    #[must_use]
    pub fn trampoline(&self, entry: u64, payload: &[u8]) -> Trampoline {
        Trampoline::new((self.preamble)(entry), payload)
    }
}
