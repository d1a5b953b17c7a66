//! Output verbosity for command diagnostics.
//!
//! Three levels controlled by CLI flags:
//! - **Quiet** (`-q`): results and errors only
//! - **Default** (no flag): results plus progress and warnings
//! - **Verbose** (`-v`): also skipped segments, section layout and timings
//!
//! Command results always go to stdout; the [`Reporter`] only gates the
//! commentary around them.

use std::fmt::Display;
use std::time::Instant;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Results and errors only.
    Quiet,
    /// Progress and warnings.
    Default,
    /// Everything.
    Verbose,
}

impl Verbosity {
    /// Derive the level from the `-q` and `-v` flags.
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Default
        }
    }
}

/// Prints diagnostics according to a fixed [`Verbosity`].
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    verbosity: Verbosity,
}

impl Reporter {
    /// Create a reporter for `verbosity`.
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Returns `true` if verbose mode is active.
    pub fn is_verbose(self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Print at default verbosity and above.
    pub fn info(self, msg: impl Display) {
        if self.verbosity >= Verbosity::Default {
            println!("{msg}");
        }
    }

    /// Print a warning to stderr at default verbosity and above.
    pub fn warn(self, msg: impl Display) {
        if self.verbosity >= Verbosity::Default {
            eprintln!("warning: {msg}");
        }
    }

    /// Print only in verbose mode.
    pub fn detail(self, msg: impl Display) {
        if self.is_verbose() {
            println!("{msg}");
        }
    }

    /// Start a timer that prints its elapsed time on drop in verbose mode.
    pub fn timer(self, label: &'static str) -> Timer {
        Timer {
            label,
            start: Instant::now(),
            reporter: self,
        }
    }
}

/// RAII timer created by [`Reporter::timer`].
pub struct Timer {
    label: &'static str,
    start: Instant,
    reporter: Reporter,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.reporter
            .detail(format_args!("  {}: {:.1?}", self.label, self.start.elapsed()));
    }
}
