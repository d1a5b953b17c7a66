//! The parsed structural model of an ELF64 file.
//!
//! [`ElfImage::parse`] reads the header, every program header and every
//! section header exactly once, then resolves section names. The image owns
//! plain copies of all records; it holds no reference to the stream, so a
//! caller may keep the image while mutating the file through the same handle.

use std::io::{Read, Seek};

use crate::error::{ElfError, StringTableError};
use crate::header::ElfHeader;
use crate::read::{read_region, stream_len};
use crate::section::{SHN_UNDEF, Section, StringTable};
use crate::segment::Segment;

/// Header, segment table and section table of one ELF64 file.
#[derive(Debug, Clone)]
pub struct ElfImage {
    header: ElfHeader,
    segments: Vec<Segment>,
    sections: Vec<Section>,
    names: Result<(), StringTableError>,
}

impl ElfImage {
    /// Parse an ELF64 file from a seekable stream.
    ///
    /// Section name resolution failures do not fail the parse: they are
    /// kept and reported by [`ElfImage::names`], and every section keeps
    /// `name == None`.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::MalformedHeader`] if the header or any table
    /// record is short or invalid, or [`ElfError::Io`] if the stream fails.
    pub fn parse<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Self, ElfError> {
        let header = ElfHeader::read(&mut *reader)?;
        let len = stream_len(&mut *reader)?;
        header.check_tables(len)?;

        let segments = (0..usize::from(header.e_phnum))
            .map(|i| Segment::read_at(&mut *reader, header.program_header_offset(i)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut sections = (0..usize::from(header.e_shnum))
            .map(|i| Section::read_at(&mut *reader, header.section_header_offset(i)))
            .collect::<Result<Vec<_>, _>>()?;

        let names = match resolve_names(&mut *reader, &header, &mut sections) {
            Ok(()) => Ok(()),
            Err(ElfError::StringTable(e)) => Err(e),
            Err(e) => return Err(e),
        };

        Ok(Self {
            header,
            segments,
            sections,
            names,
        })
    }

    /// Returns the parsed file header.
    #[must_use]
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// Returns the virtual address of the entry point.
    #[must_use]
    pub fn entry_point(&self) -> u64 {
        self.header.e_entry
    }

    /// Returns all program headers in table order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns all section headers in table order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Returns `(table_index, segment)` for every `PT_LOAD` segment, in order.
    pub fn load_segments(&self) -> impl Iterator<Item = (usize, &Segment)> {
        self.segments.iter().enumerate().filter(|(_, s)| s.is_load())
    }

    /// Outcome of section name resolution.
    ///
    /// # Errors
    ///
    /// Returns the [`StringTableError`] that stopped resolution.
    pub fn names(&self) -> Result<(), StringTableError> {
        self.names
    }

    /// Finds the first section with the given resolved name.
    #[must_use]
    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == Some(name))
    }

    /// For every segment, the names of the sections whose virtual address
    /// range lies entirely inside the segment's `[vaddr, vaddr + memsz)`.
    ///
    /// The result is indexed like [`ElfImage::segments`]. A segment that
    /// contains nothing yields an empty list; sections without a resolved
    /// name are left out.
    #[must_use]
    pub fn analyze_segments(&self) -> Vec<Vec<&str>> {
        self.segments
            .iter()
            .map(|seg| {
                self.sections
                    .iter()
                    .filter(|sec| seg.contains_range(sec.sh_addr, sec.sh_size))
                    .filter_map(Section::name)
                    .collect()
            })
            .collect()
    }
}

/// Attach names from the `e_shstrndx` string table to every section.
///
/// All names are resolved before any is attached, so a failure leaves
/// every section unnamed.
fn resolve_names<R: Read + Seek + ?Sized>(
    reader: &mut R,
    header: &ElfHeader,
    sections: &mut [Section],
) -> Result<(), ElfError> {
    if sections.is_empty() {
        return Ok(());
    }
    let index = header.e_shstrndx;
    if index == SHN_UNDEF {
        return Err(StringTableError::Undefined.into());
    }
    let Some(shstrtab) = sections.get(usize::from(index)) else {
        return Err(StringTableError::IndexOutOfRange {
            index,
            count: header.e_shnum,
        }
        .into());
    };

    // Names run to their NUL even past `sh_size`; only end of file stops them.
    let data = read_region(reader, shstrtab.sh_offset, u64::MAX)?;
    let table = StringTable::new(data);

    let names = sections
        .iter()
        .map(|s| table.get(s.sh_name))
        .collect::<Result<Vec<_>, _>>()?;
    for (section, name) in sections.iter_mut().zip(names) {
        section.name = Some(name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElfBuilder;
    use crate::error::Malformed;
    use crate::section::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS, SHT_PROGBITS};
    use crate::segment::{PF_R, PF_W, PF_X, PT_NOTE};
    use std::io::Cursor;

    fn parse(buf: Vec<u8>) -> Result<ElfImage, ElfError> {
        ElfImage::parse(&mut Cursor::new(buf))
    }

    /// Two load segments (text, data) and sections laid out inside them.
    fn sample() -> Vec<u8> {
        ElfBuilder::new()
            .load(PF_R | PF_X, 0x1000, 0x40_1000, 0x200, 0x200)
            .load(PF_R | PF_W, 0x2000, 0x40_3000, 0x100, 0x800)
            .section(".text", SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, 0x40_1000, 0x180)
            .section(".rodata", SHT_PROGBITS, SHF_ALLOC, 0x40_1180, 0x80)
            .section(".data", SHT_PROGBITS, SHF_ALLOC | SHF_WRITE, 0x40_3000, 0x100)
            .section(".bss", SHT_NOBITS, SHF_ALLOC | SHF_WRITE, 0x40_3100, 0x700)
            .section(".comment", SHT_PROGBITS, 0, 0, 0x20)
            .build()
    }

    #[test]
    fn parses_all_tables() {
        let img = parse(sample()).expect("valid image");
        assert_eq!(img.segments().len(), 2);
        // null + 5 named + .shstrtab
        assert_eq!(img.sections().len(), 7);
        assert_eq!(img.names(), Ok(()));
        assert_eq!(img.sections()[1].name(), Some(".text"));
        assert_eq!(img.sections()[6].name(), Some(".shstrtab"));
        assert_eq!(img.section_by_name(".bss").unwrap().sh_size, 0x700);
    }

    #[test]
    fn load_segments_keep_table_index() {
        let buf = ElfBuilder::new()
            .segment(Segment {
                p_type: PT_NOTE,
                p_flags: PF_R,
                p_offset: 0,
                p_vaddr: 0,
                p_paddr: 0,
                p_filesz: 0,
                p_memsz: 0,
                p_align: 4,
            })
            .load(PF_R | PF_X, 0x1000, 0x1000, 0x10, 0x10)
            .build();
        let img = parse(buf).unwrap();
        let loads: Vec<_> = img.load_segments().map(|(i, _)| i).collect();
        assert_eq!(loads, vec![1]);
    }

    #[test]
    fn analyze_maps_sections_to_segments() {
        let img = parse(sample()).unwrap();
        let map = img.analyze_segments();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0], vec![".text", ".rodata"]);
        assert_eq!(map[1], vec![".data", ".bss"]);
    }

    #[test]
    fn analyze_segment_without_sections_is_empty() {
        let buf = ElfBuilder::new()
            .load(PF_R | PF_X, 0x1000, 0x1000, 0x10, 0x10)
            .build();
        let img = parse(buf).unwrap();
        assert_eq!(img.analyze_segments(), vec![Vec::<&str>::new()]);
    }

    #[test]
    fn straddling_section_is_not_contained() {
        let buf = ElfBuilder::new()
            .load(PF_R | PF_X, 0x1000, 0x1000, 0x100, 0x100)
            .section(".wide", SHT_PROGBITS, SHF_ALLOC, 0x10f0, 0x20)
            .build();
        let img = parse(buf).unwrap();
        assert!(img.analyze_segments()[0].is_empty());
    }

    #[test]
    fn bad_string_index_keeps_structure() {
        let mut buf = sample();
        buf[62..64].copy_from_slice(&42u16.to_le_bytes());
        let img = parse(buf).expect("string table errors are not fatal");
        assert_eq!(
            img.names(),
            Err(StringTableError::IndexOutOfRange { index: 42, count: 7 })
        );
        assert_eq!(img.segments().len(), 2);
        assert!(img.sections().iter().all(|s| s.name().is_none()));
        assert!(img.analyze_segments().iter().all(Vec::is_empty));
    }

    /// Rewrite a field of the `.shstrtab` header, which the builder puts last.
    fn patch_shstrtab(buf: &mut [u8], field: usize, value: u64) {
        let shoff = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        let shoff = usize::try_from(shoff).unwrap();
        let shnum = usize::from(u16::from_le_bytes(buf[60..62].try_into().unwrap()));
        let at = shoff + (shnum - 1) * 64 + field;
        buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn names_ignore_short_table_size() {
        let mut buf = sample();
        patch_shstrtab(&mut buf, 32, 1);
        let img = parse(buf).unwrap();
        assert_eq!(img.names(), Ok(()));
        assert_eq!(img.sections()[1].name(), Some(".text"));
        assert_eq!(img.analyze_segments()[0], vec![".text", ".rodata"]);
    }

    #[test]
    fn names_ignore_table_size_past_eof() {
        let mut buf = sample();
        patch_shstrtab(&mut buf, 32, 0x10000);
        let img = parse(buf).unwrap();
        assert_eq!(img.names(), Ok(()));
        assert_eq!(img.section_by_name(".bss").unwrap().sh_size, 0x700);
    }

    #[test]
    fn name_running_into_eof_is_unterminated() {
        let mut buf = sample();
        buf.extend_from_slice(b"abc");
        let tail = buf.len() as u64 - 3;
        patch_shstrtab(&mut buf, 24, tail);
        let img = parse(buf).unwrap();
        // The null section's name (offset 0) is "abc" with no NUL before EOF.
        assert_eq!(img.names(), Err(StringTableError::Unterminated { name: 0 }));
        assert!(img.sections().iter().all(|s| s.name().is_none()));
    }

    #[test]
    fn name_offset_past_eof() {
        let mut buf = sample();
        let past = buf.len() as u64 + 0x10;
        patch_shstrtab(&mut buf, 24, past);
        let img = parse(buf).unwrap();
        assert_eq!(
            img.names(),
            Err(StringTableError::NameOutOfRange { name: 0, size: 0 })
        );
    }

    #[test]
    fn undefined_string_index() {
        let mut buf = sample();
        buf[62..64].copy_from_slice(&0u16.to_le_bytes());
        let img = parse(buf).unwrap();
        assert_eq!(img.names(), Err(StringTableError::Undefined));
    }

    #[test]
    fn no_sections_resolves_trivially() {
        let img = parse(ElfBuilder::new().build()).unwrap();
        assert!(img.sections().is_empty());
        assert_eq!(img.names(), Ok(()));
    }

    #[test]
    fn truncated_section_table_is_malformed() {
        let buf = sample();
        let shoff = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        let cut = buf[..usize::try_from(shoff).unwrap() + 10].to_vec();
        let err = parse(cut).unwrap_err();
        assert!(matches!(
            err,
            ElfError::MalformedHeader {
                reason: Malformed::OutOfBounds { .. },
                ..
            }
        ));
        assert_eq!(err.offset(), Some(shoff));
    }

    #[test]
    fn segment_offsets_match_construction() {
        let img = parse(sample()).unwrap();
        let offsets: Vec<_> = img.segments().iter().map(|s| s.p_offset).collect();
        assert_eq!(offsets, vec![0x1000, 0x2000]);
        assert_eq!(img.entry_point(), img.header().e_entry);
    }
}
