//! Code cave search.
//!
//! A cave is the stretch of zero bytes that follows an executable `PT_LOAD`
//! segment's file content, up to where the next load segment begins in
//! virtual memory. Virtual-address arithmetic finds candidates; every
//! candidate is then confirmed against the bytes actually in the file.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use elfcave_elf::Segment;

use crate::error::PatchError;

/// A verified cave behind one load segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cave {
    /// Program header index of the segment the cave follows.
    pub segment: usize,
    /// Number of verified zero bytes.
    pub size: u64,
    /// File offset of the first cave byte.
    pub offset: u64,
    /// Virtual address the first cave byte would be mapped at.
    pub vaddr: u64,
}

/// Why a load segment was not reported as a cave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The segment is not mapped executable.
    NotExecutable,
    /// The segment's file-backed end already reaches the next segment.
    NoVirtualGap {
        /// `vaddr + filesz` of this segment.
        end: u64,
        /// `vaddr` of the next load segment.
        next: u64,
    },
    /// The gap exists but has too few zero bytes in the file.
    TooSmall {
        /// Zero bytes actually found.
        verified: u64,
        /// Bytes of code that must fit.
        needed: u64,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotExecutable => write!(f, "not executable"),
            Self::NoVirtualGap { end, next } => {
                write!(f, "content ends at {end:#x}, next segment starts at {next:#x}")
            }
            Self::TooSmall { verified, needed } => {
                write!(f, "only {verified} zero bytes, need more than {needed}")
            }
        }
    }
}

/// A load segment the search passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedSegment {
    /// Program header index.
    pub segment: usize,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// How to choose among several caves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CavePolicy {
    /// The first cave in segment order.
    #[default]
    First,
    /// The cave with the most verified bytes; the earliest wins ties.
    Largest,
}

/// Result of a cave search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaveScan {
    /// Caves larger than the requested size, in segment order.
    pub caves: Vec<Cave>,
    /// Load segments that were considered and rejected, in segment order.
    pub skipped: Vec<SkippedSegment>,
}

impl CaveScan {
    /// Pick a cave according to `policy`.
    #[must_use]
    pub fn select(&self, policy: CavePolicy) -> Option<&Cave> {
        match policy {
            CavePolicy::First => self.caves.first(),
            CavePolicy::Largest => self.caves.iter().rev().max_by_key(|c| c.size),
        }
    }

    /// The cave behind program header `segment`, if one was found.
    #[must_use]
    pub fn for_segment(&self, segment: usize) -> Option<&Cave> {
        self.caves.iter().find(|c| c.segment == segment)
    }
}

/// Find every cave that can hold more than `need_size` bytes.
///
/// `segments` is the full program header table; indices in the result refer
/// to it. The last load segment is never a candidate, since a cave must lie
/// between two loaded segments.
///
/// # Errors
///
/// Returns [`PatchError::NoLoadSegment`] if there is no `PT_LOAD` segment,
/// or [`PatchError::Io`] if the file cannot be read.
pub fn find_caves<F: Read + Seek + ?Sized>(
    file: &mut F,
    segments: &[Segment],
    need_size: u64,
) -> Result<CaveScan, PatchError> {
    let loads: Vec<(usize, &Segment)> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_load())
        .collect();
    if loads.is_empty() {
        return Err(PatchError::NoLoadSegment);
    }

    let mut scan = CaveScan::default();
    for pair in loads.windows(2) {
        let (index, cur) = pair[0];
        let (_, next) = pair[1];
        let skip = |reason| SkippedSegment {
            segment: index,
            reason,
        };

        if !cur.is_executable() {
            scan.skipped.push(skip(SkipReason::NotExecutable));
            continue;
        }

        let end = cur.file_backed_vend();
        if end >= next.p_vaddr {
            scan.skipped.push(skip(SkipReason::NoVirtualGap {
                end,
                next: next.p_vaddr,
            }));
            continue;
        }

        let offset = cur.file_end();
        let verified = verify_cave(&mut *file, offset, next.p_vaddr - end)?;
        if verified <= need_size {
            scan.skipped.push(skip(SkipReason::TooSmall {
                verified,
                needed: need_size,
            }));
            continue;
        }

        scan.caves.push(Cave {
            segment: index,
            size: verified,
            offset,
            vaddr: end,
        });
    }
    Ok(scan)
}

/// Count the zero bytes at `start`, up to `limit` bytes or end of file.
///
/// # Errors
///
/// Returns [`PatchError::Io`] if the file cannot be read.
pub fn verify_cave<F: Read + Seek + ?Sized>(
    file: &mut F,
    start: u64,
    limit: u64,
) -> Result<u64, PatchError> {
    let io_err = |source: io::Error| PatchError::Io {
        offset: start,
        source,
    };
    file.seek(SeekFrom::Start(start)).map_err(io_err)?;

    let mut window = file.take(limit);
    let mut buf = [0u8; 4096];
    let mut count = 0u64;
    loop {
        let n = match window.read(&mut buf) {
            Ok(0) => return Ok(count),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        };
        match buf[..n].iter().position(|&b| b != 0) {
            Some(pos) => return Ok(count + pos as u64),
            None => count += n as u64,
        }
    }
}
