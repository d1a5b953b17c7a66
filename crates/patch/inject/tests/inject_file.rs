//! Injection against real files on disk.

use std::fs::{self, OpenOptions};
use std::path::Path;

use elfcave_elf::builder::ElfBuilder;
use elfcave_elf::{ElfImage, PF_R, PF_W, PF_X, PT_NOTE, Segment};
use elfcave_inject::{CavePolicy, Injector, PatchError, X86_64_PREAMBLE_LEN};

const PAYLOAD: &[u8] = &[0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0xcc];

/// Text segment of 100 bytes at vaddr 0x1000 with a 100 byte zero run
/// behind it, then a data segment.
fn sample() -> Vec<u8> {
    ElfBuilder::new()
        .entry(0x1000)
        .load(PF_R | PF_X, 0x1000, 0x1000, 100, 100)
        .load(PF_R | PF_W, 0x10C8, 0x3000, 0x10, 0x10)
        .bytes(0x1000, &[0xCC; 100])
        .bytes(0x10C8, &[0xAA; 0x10])
        .build()
}

fn inject_at(path: &Path) -> Result<elfcave_inject::InjectionReport, PatchError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    Injector::new(&mut file)?.inject(PAYLOAD, CavePolicy::First)
}

fn reparse(path: &Path) -> ElfImage {
    let mut file = fs::File::open(path).unwrap();
    ElfImage::parse(&mut file).unwrap()
}

#[test]
fn injects_into_file_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("target.elf");
    fs::write(&path, sample()).unwrap();

    let report = inject_at(&path).unwrap();
    assert_eq!(report.segment, 0);
    assert_eq!(report.code_offset, 0x1064);
    assert_eq!(report.code_len, 30);
    assert_eq!(report.new_entry, 0x1064);

    let image = reparse(&path);
    assert_eq!(image.entry_point(), 0x1064);
    assert_eq!(image.segments()[0].p_filesz, 130);
    assert_eq!(image.segments()[0].p_memsz, 130);
    assert_eq!(image.segments()[1].p_filesz, 0x10);
    assert_eq!(image.segments()[1].p_vaddr, 0x3000);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), sample().len());
    let code = &bytes[0x1064..0x1064 + 30];
    assert_eq!(&code[12..20], &0x1000u64.to_le_bytes());
    assert_eq!(&code[X86_64_PREAMBLE_LEN..], PAYLOAD);
}

#[test]
fn second_injection_chains_to_first() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("target.elf");
    fs::write(&path, sample()).unwrap();

    inject_at(&path).unwrap();
    let second = inject_at(&path).unwrap();
    assert_eq!(second.original_entry, 0x1064);
    assert_eq!(second.code_offset, 0x1082);
    assert_eq!(second.cave_size, 70);
    assert_eq!(second.new_size, 160);

    let image = reparse(&path);
    assert_eq!(image.entry_point(), 0x1082);
    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[0x1082 + 12..0x1082 + 20], &0x1064u64.to_le_bytes());

    let third = inject_at(&path).unwrap();
    assert_eq!(third.cave_size, 40);

    // 10 bytes remain.
    let err = inject_at(&path).unwrap_err();
    assert!(matches!(err, PatchError::NoCaveFound { needed: 30 }));
}

#[test]
fn refusal_leaves_file_untouched() {
    let original = ElfBuilder::new()
        .segment(Segment {
            p_type: PT_NOTE,
            p_flags: PF_R,
            p_offset: 0x200,
            p_vaddr: 0,
            p_paddr: 0,
            p_filesz: 0x20,
            p_memsz: 0x20,
            p_align: 4,
        })
        .pad_to(0x400)
        .build();

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("notes.elf");
    fs::write(&path, &original).unwrap();

    let err = inject_at(&path).unwrap_err();
    assert!(matches!(err, PatchError::NoLoadSegment));
    assert_eq!(fs::read(&path).unwrap(), original);
}

#[test]
fn foreign_machine_leaves_file_untouched() {
    let original = ElfBuilder::new()
        .machine(183)
        .load(PF_R | PF_X, 0x1000, 0x1000, 100, 100)
        .load(PF_R | PF_W, 0x2000, 0x3000, 0x10, 0x10)
        .build();

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("aarch64.elf");
    fs::write(&path, &original).unwrap();

    let err = inject_at(&path).unwrap_err();
    assert!(matches!(err, PatchError::UnsupportedMachine(183)));
    assert_eq!(fs::read(&path).unwrap(), original);
}
