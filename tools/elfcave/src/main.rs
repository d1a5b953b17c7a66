//! elfcave: code cave finder and entry-point trampoline injector.
//!
//! `caves` lists the zero-filled gaps behind executable load segments.
//! `inject` writes a fork trampoline plus payload into one of them, grows
//! the segment to cover it and points the entry at it.

mod cli;
mod config;
mod verbose;

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use elfcave_elf::ElfImage;
use elfcave_inject::{Injector, Target, find_caves};

use crate::cli::{CavesArgs, Command, InjectArgs};
use crate::config::Config;
use crate::verbose::{Reporter, Verbosity};

fn main() -> Result<()> {
    run(&cli::Cli::parse())
}

fn run(cli: &cli::Cli) -> Result<()> {
    let reporter = Reporter::new(Verbosity::from_flags(cli.quiet, cli.verbose));
    // Loaded for every command so a bad `--config` is always reported.
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Caves(ref args) => cmd_caves(reporter, args),
        Command::Inject(ref args) => cmd_inject(reporter, &config, args),
    }
}

// ===========================================================================
// caves
// ===========================================================================

fn cmd_caves(reporter: Reporter, args: &CavesArgs) -> Result<()> {
    let path = &args.file;
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let image = {
        let _t = reporter.timer("parse");
        ElfImage::parse(&mut file).with_context(|| format!("failed to parse {}", path.display()))?
    };
    if let Err(e) = image.names() {
        reporter.warn(format_args!("section names unavailable: {e}"));
    }

    let scan = {
        let _t = reporter.timer("cave scan");
        find_caves(&mut file, image.segments(), args.need)
            .with_context(|| format!("cave search failed in {}", path.display()))?
    };

    if scan.caves.is_empty() {
        println!("no caves larger than {} bytes", args.need);
    }
    let layout = image.analyze_segments();
    for cave in &scan.caves {
        println!(
            "segment {:>2}  offset {:#010x}  vaddr {:#012x}  size {}",
            cave.segment, cave.offset, cave.vaddr, cave.size
        );
        if let Some(names) = layout.get(cave.segment).filter(|n| !n.is_empty()) {
            reporter.detail(format_args!("            sections: {}", names.join(" ")));
        }
    }
    for skip in &scan.skipped {
        reporter.detail(format_args!("segment {:>2}  skipped: {}", skip.segment, skip.reason));
    }
    Ok(())
}

// ===========================================================================
// inject
// ===========================================================================

fn cmd_inject(reporter: Reporter, config: &Config, args: &InjectArgs) -> Result<()> {
    let path = &args.file;
    let payload = fs::read(&args.payload)
        .with_context(|| format!("failed to read payload {}", args.payload.display()))?;
    let target = match args.segment {
        Some(index) => Target::Segment(index),
        None => Target::Policy(args.policy.unwrap_or(config.inject.policy).into()),
    };

    // A dry run never opens the target for writing.
    let mut file = OpenOptions::new()
        .read(true)
        .write(!args.dry_run)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut injector =
        Injector::new(&mut file).with_context(|| format!("failed to parse {}", path.display()))?;
    let plan = injector
        .plan(&payload, target)
        .with_context(|| format!("cannot inject into {}", path.display()))?;

    reporter.info(format_args!(
        "segment {}: {} bytes at offset {:#x} (cave of {} bytes)",
        plan.segment(),
        plan.code.len(),
        plan.code_offset(),
        plan.cave.size
    ));
    reporter.detail(format_args!(
        "  p_filesz {:#x} -> {:#x}, p_memsz {:#x} -> {:#x}",
        plan.old_filesz, plan.new_size, plan.old_memsz, plan.new_size
    ));

    if args.dry_run {
        println!(
            "dry run: entry would change {:#x} -> {:#x}; {} left unchanged",
            plan.original_entry,
            plan.code_vaddr(),
            path.display()
        );
        return Ok(());
    }

    if args.backup || config.inject.backup {
        let backup = backup_path(path);
        fs::copy(path, &backup).with_context(|| {
            format!("failed to back up {} to {}", path.display(), backup.display())
        })?;
        reporter.info(format_args!("backup written to {}", backup.display()));
    }

    let report = injector
        .apply(&plan)
        .with_context(|| format!("failed while patching {}", path.display()))?;
    println!(
        "injected {} bytes into segment {}; entry {:#x} -> {:#x}",
        report.code_len, report.segment, report.original_entry, report.new_entry
    );
    Ok(())
}

/// `<path>.bak`, keeping any existing extension.
fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InjectConfig, Policy};
    use elfcave_elf::builder::ElfBuilder;
    use elfcave_elf::{PF_R, PF_W, PF_X};

    const PAYLOAD: &[u8] = &[0x90; 8];

    fn sample() -> Vec<u8> {
        ElfBuilder::new()
            .entry(0x1000)
            .load(PF_R | PF_X, 0x1000, 0x1000, 100, 0x1000)
            .load(PF_R | PF_W, 0x1096, 0x3000, 0x10, 0x10)
            .bytes(0x1000, &[0xCC; 100])
            .bytes(0x1096, &[0xAA; 0x10])
            .build()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        target: PathBuf,
        payload: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.out");
        let payload = dir.path().join("payload.bin");
        fs::write(&target, sample()).unwrap();
        fs::write(&payload, PAYLOAD).unwrap();
        Fixture {
            _dir: dir,
            target,
            payload,
        }
    }

    fn args(fx: &Fixture) -> InjectArgs {
        InjectArgs {
            file: fx.target.clone(),
            payload: fx.payload.clone(),
            segment: None,
            policy: None,
            dry_run: false,
            backup: false,
        }
    }

    fn quiet() -> Reporter {
        Reporter::new(Verbosity::Quiet)
    }

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(backup_path(Path::new("/tmp/a.out")), PathBuf::from("/tmp/a.out.bak"));
        assert_eq!(backup_path(Path::new("prog")), PathBuf::from("prog.bak"));
    }

    #[test]
    fn inject_patches_file() {
        let fx = fixture();
        cmd_inject(quiet(), &Config::default(), &args(&fx)).unwrap();

        let image = ElfImage::parse(&mut File::open(&fx.target).unwrap()).unwrap();
        assert_eq!(image.entry_point(), 0x1064);
        assert_eq!(image.segments()[0].p_filesz, 130);
        assert!(!backup_path(&fx.target).exists());
    }

    #[test]
    fn dry_run_leaves_file_unchanged() {
        let fx = fixture();
        let args = InjectArgs {
            dry_run: true,
            ..args(&fx)
        };
        cmd_inject(quiet(), &Config::default(), &args).unwrap();
        assert_eq!(fs::read(&fx.target).unwrap(), sample());
    }

    #[test]
    fn backup_from_config() {
        let fx = fixture();
        let config = Config {
            inject: InjectConfig {
                policy: Policy::Largest,
                backup: true,
            },
        };
        cmd_inject(quiet(), &config, &args(&fx)).unwrap();
        assert_eq!(fs::read(backup_path(&fx.target)).unwrap(), sample());
        assert_ne!(fs::read(&fx.target).unwrap(), sample());
    }

    #[test]
    fn refused_segment_reports_context() {
        let fx = fixture();
        let args = InjectArgs {
            segment: Some(1),
            backup: true,
            ..args(&fx)
        };
        let err = cmd_inject(quiet(), &Config::default(), &args).unwrap_err();
        assert!(err.to_string().starts_with("cannot inject into"));
        assert!(!backup_path(&fx.target).exists());
        assert_eq!(fs::read(&fx.target).unwrap(), sample());
    }

    #[test]
    fn caves_on_valid_file() {
        let fx = fixture();
        let args = CavesArgs {
            file: fx.target.clone(),
            need: 30,
        };
        cmd_caves(quiet(), &args).unwrap();
    }

    #[test]
    fn missing_explicit_config_fails_every_command() {
        let fx = fixture();
        let missing = fx.target.with_file_name("missing.toml");
        let target = fx.target.to_str().unwrap();
        let payload = fx.payload.to_str().unwrap();
        let config = missing.to_str().unwrap();

        for args in [
            vec!["elfcave", "-q", "-c", config, "caves", target],
            vec!["elfcave", "-q", "-c", config, "inject", target, payload],
        ] {
            let cli = cli::Cli::try_parse_from(args).unwrap();
            let err = run(&cli).unwrap_err();
            assert!(err.to_string().contains("missing.toml"));
        }
        assert_eq!(fs::read(&fx.target).unwrap(), sample());
    }

    #[test]
    fn explicit_config_is_honoured_by_caves() {
        let fx = fixture();
        let config = fx.target.with_file_name("elfcave.toml");
        fs::write(&config, "[inject]\npolicy = \"largest\"\n").unwrap();
        let cli = cli::Cli::try_parse_from([
            "elfcave",
            "-q",
            "-c",
            config.to_str().unwrap(),
            "caves",
            fx.target.to_str().unwrap(),
        ])
        .unwrap();
        run(&cli).unwrap();
    }

    #[test]
    fn caves_on_missing_file() {
        let args = CavesArgs {
            file: PathBuf::from("/nonexistent/elfcave/a.out"),
            need: 0,
        };
        assert!(cmd_caves(quiet(), &args).is_err());
    }
}
