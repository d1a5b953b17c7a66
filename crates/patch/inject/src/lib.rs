//! Code cave search and entry-point trampoline injection for ELF64 files.
//!
//! A *code cave* is the run of zero bytes that sits in the file after an
//! executable `PT_LOAD` segment's content and before the next load segment
//! begins in memory. This crate finds such caves and can write a small
//! trampoline into one: the segment is grown to cover the code and the
//! entry point is redirected to it. The trampoline forks, resumes the
//! original entry point in the parent and runs the payload in the child.
//!
//! # Usage
//!
//! ```no_run
//! use std::fs::OpenOptions;
//!
//! use elfcave_inject::{CavePolicy, Injector};
//!
//! fn patch(path: &str, payload: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut file = OpenOptions::new().read(true).write(true).open(path)?;
//!     let report = Injector::new(&mut file)?.inject(payload, CavePolicy::First)?;
//!     println!("entry {:#x} -> {:#x}", report.original_entry, report.new_entry);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod arch;
pub mod cave;
pub mod error;
pub mod inject;
pub mod stub;

pub use arch::Arch;
pub use cave::{Cave, CavePolicy, CaveScan, SkipReason, SkippedSegment, find_caves, verify_cave};
pub use error::PatchError;
pub use inject::{InjectionPlan, InjectionReport, Injector, Target};
pub use stub::{Trampoline, X86_64_PREAMBLE_LEN};
