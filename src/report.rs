//! Console reporting
//!
//! The probes print human-readable diagnostic lines. [`Reporter`] writes
//! them to any sink so tests can capture what a run printed; `detail`
//! lines only appear in verbose mode.

use crate::error::Result;
use std::fmt;
use std::io::{self, Write};

/// Diagnostic line writer
pub struct Reporter<W: Write = io::Stdout> {
    out: W,
    verbose: bool,
}

impl Reporter<io::Stdout> {
    /// Reporter printing to stdout
    pub fn stdout(verbose: bool) -> Self {
        Self::new(io::stdout(), verbose)
    }
}

impl Reporter<Vec<u8>> {
    /// Reporter collecting output in memory
    pub fn capture(verbose: bool) -> Self {
        Self::new(Vec::new(), verbose)
    }

    /// Captured output as text
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }
}

impl<W: Write> Reporter<W> {
    /// Create a reporter over `out`
    pub fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }

    /// Print a line unconditionally
    pub fn line(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        writeln!(self.out, "{}", args)?;
        self.out.flush()?;
        Ok(())
    }

    /// Print a line in verbose mode only
    pub fn detail(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        if self.verbose {
            self.line(args)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_respects_verbosity() {
        let mut quiet = Reporter::capture(false);
        quiet.line(format_args!("Number of root devices = {}", 2)).unwrap();
        quiet.detail(format_args!("* Device: {}", "hidden")).unwrap();
        assert_eq!(quiet.output(), "Number of root devices = 2\n");

        let mut verbose = Reporter::capture(true);
        verbose.detail(format_args!("* Device: {}", "shown")).unwrap();
        assert_eq!(verbose.output(), "* Device: shown\n");
    }
}
