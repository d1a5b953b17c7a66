//! In-place trampoline injection.
//!
//! Injection is split into a read-only [`Injector::plan`] and a writing
//! [`Injector::apply`]. Every check that can fail (machine support, load
//! segments, cave search) happens while planning, so a refused injection
//! never touches the file. Applying writes three regions in order: the
//! code, the segment's size fields, then the entry point. There is no
//! rollback if a write fails part way through.
//!
//! Injection is not idempotent: each run wraps the current entry point in
//! a new trampoline and consumes more of the cave.

use std::io::{Read, Seek, SeekFrom, Write};

use elfcave_elf::{ENTRY_FIELD_OFFSET, ElfImage};

use crate::arch;
use crate::cave::{self, Cave, CavePolicy, CaveScan};
use crate::error::PatchError;

/// Which cave an injection should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Let a policy choose among all verified caves.
    Policy(CavePolicy),
    /// Use the cave behind this program header index.
    Segment(usize),
}

impl Default for Target {
    fn default() -> Self {
        Self::Policy(CavePolicy::First)
    }
}

/// Everything needed to patch the file, computed without writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPlan {
    /// The cave the code goes into.
    pub cave: Cave,
    /// Preamble followed by payload.
    pub code: Vec<u8>,
    /// Entry point before injection; the trampoline resumes here.
    pub original_entry: u64,
    /// Segment `p_filesz` before injection.
    pub old_filesz: u64,
    /// Segment `p_memsz` before injection.
    pub old_memsz: u64,
    /// Value written to both `p_filesz` and `p_memsz`.
    pub new_size: u64,
    /// File offset of the segment's `p_filesz` field.
    pub size_fields_offset: u64,
}

impl InjectionPlan {
    /// Program header index being extended.
    #[must_use]
    pub fn segment(&self) -> usize {
        self.cave.segment
    }

    /// File offset the code is written at.
    #[must_use]
    pub fn code_offset(&self) -> u64 {
        self.cave.offset
    }

    /// Virtual address of the code; becomes the new entry point.
    #[must_use]
    pub fn code_vaddr(&self) -> u64 {
        self.cave.vaddr
    }
}

/// Summary of a completed injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionReport {
    /// Program header index that was extended.
    pub segment: usize,
    /// File offset the code was written at.
    pub code_offset: u64,
    /// Bytes of code written.
    pub code_len: u64,
    /// Verified cave size before injection.
    pub cave_size: u64,
    /// Entry point before injection.
    pub original_entry: u64,
    /// Entry point after injection.
    pub new_entry: u64,
    /// Segment `p_filesz` before injection.
    pub old_filesz: u64,
    /// Segment `p_memsz` before injection.
    pub old_memsz: u64,
    /// Segment `p_filesz` and `p_memsz` after injection.
    pub new_size: u64,
}

/// Parses an ELF file once and injects a trampoline into one of its caves.
///
/// The injector borrows the file exclusively for its whole lifetime.
/// Applying a plan consumes the injector, since the parsed image no longer
/// describes the file afterwards.
pub struct Injector<'f, F: ?Sized> {
    file: &'f mut F,
    image: ElfImage,
}

impl<'f, F: Read + Write + Seek + ?Sized> Injector<'f, F> {
    /// Parse `file` and prepare to patch it.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::Elf`] if the file cannot be parsed.
    pub fn new(file: &'f mut F) -> Result<Self, PatchError> {
        let image = ElfImage::parse(&mut *file)?;
        Ok(Self { file, image })
    }

    /// The parsed structure of the file as it was when opened.
    #[must_use]
    pub fn image(&self) -> &ElfImage {
        &self.image
    }

    /// Search for caves that can hold more than `need_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::NoLoadSegment`] or [`PatchError::Io`].
    pub fn caves(&mut self, need_size: u64) -> Result<CaveScan, PatchError> {
        cave::find_caves(&mut *self.file, self.image.segments(), need_size)
    }

    /// Work out how `payload` would be injected, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::UnsupportedMachine`],
    /// [`PatchError::NoLoadSegment`], [`PatchError::NoCaveFound`], or
    /// [`PatchError::NotACave`] if `target` names a segment without a
    /// large-enough cave.
    pub fn plan(&mut self, payload: &[u8], target: Target) -> Result<InjectionPlan, PatchError> {
        let header = *self.image.header();
        let arch = arch::lookup(header.e_machine)?;
        let trampoline = arch.trampoline(header.e_entry, payload);
        let needed = trampoline.len();

        let scan = self.caves(needed)?;
        let cave = match target {
            Target::Policy(policy) => scan
                .select(policy)
                .ok_or(PatchError::NoCaveFound { needed })?,
            Target::Segment(segment) => scan
                .for_segment(segment)
                .ok_or(PatchError::NotACave { segment, needed })?,
        };

        let seg = self.image.segments()[cave.segment];
        Ok(InjectionPlan {
            cave: *cave,
            code: trampoline.into_code(),
            original_entry: header.e_entry,
            old_filesz: seg.p_filesz,
            old_memsz: seg.p_memsz,
            new_size: seg.p_filesz + needed,
            size_fields_offset: header.program_header_offset(cave.segment)
                + arch.size_field_offset,
        })
    }

    /// Write a plan into the file.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::Io`] with the offset of the failed write. Any
    /// writes before it remain in the file.
    pub fn apply(self, plan: &InjectionPlan) -> Result<InjectionReport, PatchError> {
        let file = self.file;
        write_at(&mut *file, plan.code_offset(), &plan.code)?;

        let mut sizes = [0u8; 16];
        sizes[..8].copy_from_slice(&plan.new_size.to_le_bytes());
        sizes[8..].copy_from_slice(&plan.new_size.to_le_bytes());
        write_at(&mut *file, plan.size_fields_offset, &sizes)?;

        write_at(&mut *file, ENTRY_FIELD_OFFSET, &plan.code_vaddr().to_le_bytes())?;

        file.flush().map_err(|source| PatchError::Io {
            offset: ENTRY_FIELD_OFFSET,
            source,
        })?;

        Ok(InjectionReport {
            segment: plan.segment(),
            code_offset: plan.code_offset(),
            code_len: plan.code.len() as u64,
            cave_size: plan.cave.size,
            original_entry: plan.original_entry,
            new_entry: plan.code_vaddr(),
            old_filesz: plan.old_filesz,
            old_memsz: plan.old_memsz,
            new_size: plan.new_size,
        })
    }

    /// Inject `payload` into the cave chosen by `policy`.
    ///
    /// # Errors
    ///
    /// See [`Injector::plan`] and [`Injector::apply`].
    pub fn inject(
        mut self,
        payload: &[u8],
        policy: CavePolicy,
    ) -> Result<InjectionReport, PatchError> {
        let plan = self.plan(payload, Target::Policy(policy))?;
        self.apply(&plan)
    }

    /// Inject `payload` into the cave behind program header `segment`.
    ///
    /// # Errors
    ///
    /// See [`Injector::plan`] and [`Injector::apply`].
    pub fn inject_into(
        mut self,
        segment: usize,
        payload: &[u8],
    ) -> Result<InjectionReport, PatchError> {
        let plan = self.plan(payload, Target::Segment(segment))?;
        self.apply(&plan)
    }
}

fn write_at<F: Write + Seek + ?Sized>(
    file: &mut F,
    offset: u64,
    data: &[u8],
) -> Result<(), PatchError> {
    let io_err = |source| PatchError::Io { offset, source };
    file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
    file.write_all(data).map_err(io_err)
}
