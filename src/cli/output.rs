//! User-facing output for Crush
//!
//! Styled, line-oriented messages for the terminal. Diagnostics go through
//! `tracing`; this is only what the user is meant to read.

use console::style;
use std::path::Path;

use crate::recompress::Savings;

/// Output handler for consistent CLI formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    /// Create a new output handler
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    /// Print a verbose message (only if verbose mode is enabled)
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{} {}", style("ℹ").dim(), style(message).dim());
        }
    }

    /// Per-file result line
    pub fn savings(&self, path: &Path, savings: &Savings) {
        if self.quiet {
            return;
        }
        if savings.replaced() {
            println!(
                "{} {}: {}",
                style("✔").green(),
                style(path.display()).underlined(),
                savings
            );
        } else {
            println!(
                "{} {}: {}",
                style("•").dim(),
                style(path.display()).underlined(),
                style(savings).dim()
            );
        }
    }

    /// Per-file failure line
    pub fn task_failed(&self, path: &Path, error: &anyhow::Error) {
        eprintln!(
            "{} {}: {:#}",
            style("✖").red(),
            style(path.display()).underlined(),
            error
        );
    }

    /// Print a key-value pair with consistent styling
    pub fn key_value(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {} {}", style(key).dim(), style(value).bold());
        }
    }
}
