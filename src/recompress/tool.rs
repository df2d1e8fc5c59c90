use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::config::{CrushConfig, Quality, TOOL_NAME};
use crate::parallel::{CancelSignal, Interrupted};

/// The external `jpeg-recompress` binary and the preset it is run with.
#[derive(Debug, Clone)]
pub struct RecompressTool {
    program: PathBuf,
    quality: Quality,
}

impl RecompressTool {
    pub fn new(program: impl Into<PathBuf>, quality: Quality) -> Self {
        Self {
            program: program.into(),
            quality,
        }
    }

    pub fn from_config(config: &CrushConfig) -> Self {
        Self::new(&config.tool, config.quality)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `<tool> --quality <preset> <src> <dst>`, killed if the handle is dropped.
    pub fn command(&self, src: &Path, dst: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--quality")
            .arg(self.quality.as_str())
            .arg(src)
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Recompress `src` into `dst`. Raising `interrupt` kills the subprocess and
    /// returns [`Interrupted`].
    pub async fn run(&self, src: &Path, dst: &Path, interrupt: &CancelSignal) -> Result<()> {
        if interrupt.is_cancelled() {
            debug!(src = %src.display(), "interrupted before {TOOL_NAME} started");
            return Err(Interrupted.into());
        }

        debug!(program = %self.program.display(), src = %src.display(), "spawning {TOOL_NAME}");
        let child = self
            .command(src, dst)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program.display()))?;

        let output = tokio::select! {
            output = child.wait_with_output() => output
                .with_context(|| format!("Failed to wait for {}", self.program.display()))?,
            _ = interrupt.cancelled() => {
                debug!(src = %src.display(), "interrupted while {TOOL_NAME} was running");
                return Err(Interrupted.into());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("{TOOL_NAME} exited with {}", output.status);
            }
            bail!("{TOOL_NAME} exited with {}: {stderr}", output.status);
        }

        Ok(())
    }
}
