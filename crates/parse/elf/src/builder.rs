//! Synthetic ELF64 image assembly for tests.
//!
//! Fields are encoded here by hand at their documented offsets, independent
//! of the parser, so that tests check the parser against the format rather
//! than against itself.
//!
//! Layout of a built image:
//!
//! ```text
//! 0x00        ELF header
//! 0x40        program headers
//! ...         zero fill, segment file ranges, bytes placed with `bytes()`
//! end         .shstrtab data, then section headers (only if sections exist)
//! ```

use crate::header::{
    ELF_MAGIC, ELF64_EHDR_SIZE, ELF64_PHDR_SIZE, ELF64_SHDR_SIZE, ELFCLASS64, ELFDATA2LSB,
    EM_X86_64, ET_EXEC,
};
use crate::section::SHT_STRTAB;
use crate::segment::{PT_LOAD, Segment};

struct SectionSpec {
    name: String,
    sh_type: u32,
    sh_flags: u64,
    sh_addr: u64,
    sh_size: u64,
}

/// Builder for in-memory ELF64 little-endian images.
pub struct ElfBuilder {
    machine: u16,
    entry: u64,
    segments: Vec<Segment>,
    sections: Vec<SectionSpec>,
    blobs: Vec<(u64, Vec<u8>)>,
    min_len: u64,
}

impl Default for ElfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ElfBuilder {
    /// An `ET_EXEC`, `EM_X86_64` image with entry `0x401000` and no tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            machine: EM_X86_64,
            entry: 0x0040_1000,
            segments: Vec::new(),
            sections: Vec::new(),
            blobs: Vec::new(),
            min_len: 0,
        }
    }

    /// Set `e_machine`.
    #[must_use]
    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    /// Set `e_entry`.
    #[must_use]
    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// Append a program header record.
    #[must_use]
    pub fn segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Append a `PT_LOAD` program header with page alignment.
    #[must_use]
    pub fn load(self, flags: u32, offset: u64, vaddr: u64, filesz: u64, memsz: u64) -> Self {
        self.segment(Segment {
            p_type: PT_LOAD,
            p_flags: flags,
            p_offset: offset,
            p_vaddr: vaddr,
            p_paddr: vaddr,
            p_filesz: filesz,
            p_memsz: memsz,
            p_align: 0x1000,
        })
    }

    /// Append a named section header. Index 0 is always the null section.
    #[must_use]
    pub fn section(
        mut self,
        name: &str,
        sh_type: u32,
        sh_flags: u64,
        sh_addr: u64,
        sh_size: u64,
    ) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_owned(),
            sh_type,
            sh_flags,
            sh_addr,
            sh_size,
        });
        self
    }

    /// Place raw bytes at a file offset.
    #[must_use]
    pub fn bytes(mut self, offset: u64, data: &[u8]) -> Self {
        self.blobs.push((offset, data.to_vec()));
        self
    }

    /// Zero-fill the file to at least `len` bytes.
    #[must_use]
    pub fn pad_to(mut self, len: u64) -> Self {
        self.min_len = self.min_len.max(len);
        self
    }

    /// Assemble the image.
    ///
    /// # Panics
    ///
    /// Panics if the image would not fit in memory.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let phoff = ELF64_EHDR_SIZE as u64;
        let ph_end = phoff + (self.segments.len() * ELF64_PHDR_SIZE) as u64;

        let mut end = ph_end.max(self.min_len);
        for seg in &self.segments {
            end = end.max(seg.p_offset + seg.p_filesz);
        }
        for (off, data) in &self.blobs {
            end = end.max(off + data.len() as u64);
        }

        // .shstrtab: leading NUL, then each name (ours, then its own).
        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        let shstrtab_name = ".shstrtab";
        for name in self
            .sections
            .iter()
            .map(|s| s.name.as_str())
            .chain(core::iter::once(shstrtab_name))
        {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }

        let has_sections = !self.sections.is_empty();
        let strtab_off = end;
        let shoff = (strtab_off + strtab.len() as u64).next_multiple_of(8);
        let shnum = if has_sections { self.sections.len() + 2 } else { 0 };
        let total = if has_sections {
            shoff + (shnum * ELF64_SHDR_SIZE) as u64
        } else {
            end
        };

        let mut buf = vec![0u8; usize::try_from(total).expect("test image fits in memory")];

        // ELF header
        buf[0..4].copy_from_slice(&ELF_MAGIC);
        buf[4] = ELFCLASS64;
        buf[5] = ELFDATA2LSB;
        buf[6] = 1; // EI_VERSION
        put(&mut buf, 16, &ET_EXEC.to_le_bytes());
        put(&mut buf, 18, &self.machine.to_le_bytes());
        put(&mut buf, 20, &1u32.to_le_bytes());
        put(&mut buf, 24, &self.entry.to_le_bytes());
        put(&mut buf, 32, &phoff.to_le_bytes());
        put(&mut buf, 40, &(if has_sections { shoff } else { 0 }).to_le_bytes());
        put(&mut buf, 52, &(ELF64_EHDR_SIZE as u16).to_le_bytes());
        put(&mut buf, 54, &(ELF64_PHDR_SIZE as u16).to_le_bytes());
        put(&mut buf, 56, &(self.segments.len() as u16).to_le_bytes());
        put(&mut buf, 58, &(ELF64_SHDR_SIZE as u16).to_le_bytes());
        put(&mut buf, 60, &(shnum as u16).to_le_bytes());
        put(&mut buf, 62, &(if has_sections { shnum as u16 - 1 } else { 0 }).to_le_bytes());

        // Program headers
        for (i, seg) in self.segments.iter().enumerate() {
            let at = phoff + (i * ELF64_PHDR_SIZE) as u64;
            put(&mut buf, at, &seg.p_type.to_le_bytes());
            put(&mut buf, at + 4, &seg.p_flags.to_le_bytes());
            put(&mut buf, at + 8, &seg.p_offset.to_le_bytes());
            put(&mut buf, at + 16, &seg.p_vaddr.to_le_bytes());
            put(&mut buf, at + 24, &seg.p_paddr.to_le_bytes());
            put(&mut buf, at + 32, &seg.p_filesz.to_le_bytes());
            put(&mut buf, at + 40, &seg.p_memsz.to_le_bytes());
            put(&mut buf, at + 48, &seg.p_align.to_le_bytes());
        }

        for (off, data) in &self.blobs {
            put(&mut buf, *off, data);
        }

        if has_sections {
            put(&mut buf, strtab_off, &strtab);
            // Section 0 stays all-zero (SHT_NULL).
            let named = self
                .sections
                .iter()
                .map(|s| (s.sh_type, s.sh_flags, s.sh_addr, 0u64, s.sh_size));
            let own = core::iter::once((SHT_STRTAB, 0, 0, strtab_off, strtab.len() as u64));
            for (i, (sh_type, flags, addr, offset, size)) in named.chain(own).enumerate() {
                let at = shoff + ((i + 1) * ELF64_SHDR_SIZE) as u64;
                put(&mut buf, at, &name_offsets[i].to_le_bytes());
                put(&mut buf, at + 4, &sh_type.to_le_bytes());
                put(&mut buf, at + 8, &flags.to_le_bytes());
                put(&mut buf, at + 16, &addr.to_le_bytes());
                put(&mut buf, at + 24, &offset.to_le_bytes());
                put(&mut buf, at + 32, &size.to_le_bytes());
                put(&mut buf, at + 48, &1u64.to_le_bytes()); // sh_addralign
            }
        }

        buf
    }
}

fn put(buf: &mut [u8], at: u64, data: &[u8]) {
    let at = usize::try_from(at).expect("test image offset fits in usize");
    buf[at..at + data.len()].copy_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_image_is_just_a_header() {
        let buf = ElfBuilder::new().build();
        assert_eq!(buf.len(), ELF64_EHDR_SIZE);
        assert_eq!(buf[..4], ELF_MAGIC);
    }

    #[test]
    fn segment_ranges_are_backed_by_file() {
        let buf = ElfBuilder::new().load(5, 0x1000, 0x1000, 0x80, 0x80).build();
        assert_eq!(buf.len(), 0x1080);
    }

    #[test]
    fn sections_follow_data() {
        let buf = ElfBuilder::new()
            .bytes(0x100, &[0xAA; 4])
            .section(".text", 1, 0, 0, 0)
            .build();
        // strtab "\0.text\0.shstrtab\0" starts right after the blob
        assert_eq!(&buf[0x104..0x10b], b"\0.text\0");
        let shoff = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        assert_eq!(shoff % 8, 0);
        assert_eq!(buf.len() as u64, shoff + 3 * 64);
    }
}
