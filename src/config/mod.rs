//! Run configuration for Crush
//!
//! Everything a run needs is resolved once at startup into a [`CrushConfig`]
//! and handed to the scheduler and the workers explicitly. Nothing is read
//! from configuration files or the environment.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::parallel::{self, FailurePolicy};

/// Base name of the recompression binary.
pub const TOOL_NAME: &str = "jpeg-recompress";

/// File name of the recompression binary on this platform.
#[cfg(windows)]
pub const TOOL_FILE_NAME: &str = "jpeg-recompress.exe";
#[cfg(not(windows))]
pub const TOOL_FILE_NAME: &str = "jpeg-recompress";

/// Quality preset passed to `jpeg-recompress --quality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Quality {
    Low,
    Medium,
    High,
    #[default]
    #[value(name = "veryhigh")]
    VeryHigh,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::VeryHigh => "veryhigh",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct CrushConfig {
    /// Path of the recompression binary
    pub tool: PathBuf,

    /// Quality preset for the tool
    pub quality: Quality,

    /// Maximum number of simultaneous recompressions
    pub workers: usize,

    /// Whether one failure cancels tasks that have not started
    pub failure_policy: FailurePolicy,
}

impl CrushConfig {
    /// Resolve the configuration from CLI-level overrides.
    pub fn resolve(
        tool: Option<PathBuf>,
        quality: Quality,
        jobs: Option<usize>,
        keep_going: bool,
    ) -> Result<Self> {
        let tool = match tool {
            Some(tool) => tool,
            None => locate_tool()?,
        };

        let workers = match jobs {
            Some(0) => bail!("--jobs must be at least 1"),
            Some(jobs) => jobs,
            None => parallel::available_workers(),
        };

        let failure_policy = if keep_going {
            FailurePolicy::KeepGoing
        } else {
            FailurePolicy::FailFast
        };

        debug!(tool = %tool.display(), %quality, workers, ?failure_policy, "resolved configuration");

        Ok(Self {
            tool,
            quality,
            workers,
            failure_policy,
        })
    }
}

/// Find the tool next to the running executable.
pub fn locate_tool() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to resolve the running executable")?;
    let exe_dir = exe
        .parent()
        .with_context(|| format!("Executable {} has no parent directory", exe.display()))?;
    Ok(tool_near(exe_dir))
}

/// The tool path inside `dir`. It is not checked for existence, so a missing
/// tool surfaces as a per-task spawn failure.
pub fn tool_near(dir: &Path) -> PathBuf {
    let sibling = dir.join(TOOL_FILE_NAME);
    if !sibling.is_file() {
        debug!(path = %sibling.display(), "{TOOL_NAME} not found next to the executable");
    }
    sibling
}
