//! Offset-driven ELF64 structural model.
//!
//! Parses the ELF64 header, program header table and section header table
//! from any `Read + Seek` stream, reading each field at its fixed width and
//! little-endian byte order. Short reads are reported with the exact file
//! offset that was attempted.
//!
//! # Usage
//!
//! ```no_run
//! use elfcave_elf::ElfImage;
//!
//! fn list_segments(path: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut file = std::fs::File::open(path)?;
//!     let image = ElfImage::parse(&mut file)?;
//!     for (seg, names) in image.segments().iter().zip(image.analyze_segments()) {
//!         println!("{:#x}: {}", seg.p_vaddr, names.join(" "));
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

#[cfg(any(test, feature = "builder"))]
pub mod builder;
pub mod error;
pub mod header;
pub mod image;
mod read;
pub mod section;
pub mod segment;

pub use error::{ElfError, Malformed, StringTableError, Table};
pub use header::{
    ELF64_EHDR_SIZE, ELF64_PHDR_SIZE, ELF64_SHDR_SIZE, EM_X86_64, ENTRY_FIELD_OFFSET, ElfHeader,
};
pub use image::ElfImage;
pub use section::{
    SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHN_UNDEF, SHT_NOBITS, SHT_NULL, SHT_PROGBITS,
    SHT_STRTAB, SHT_SYMTAB, Section, StringTable,
};
pub use segment::{PF_R, PF_W, PF_X, PHDR_FILESZ_OFFSET, PT_LOAD, PT_NOTE, Segment};
