//! In-place JPEG recompression
//!
//! A task recompresses its source into a temporary file created in the same
//! directory, then renames that file over the source. The rename stays on one
//! volume, so the source is either the old bytes or the new bytes and never
//! anything in between. Every failure path drops the temporary file, which
//! removes it from disk.

pub mod tool;

pub use tool::RecompressTool;

use anyhow::{Context, Result, bail};
use indicatif::DecimalBytes;
use std::fmt;
use std::path::Path;
use tempfile::TempPath;
use tracing::debug;

use crate::parallel::CancelSignal;

/// Prefix of the hidden temporary files written next to each source.
pub const TEMP_PREFIX: &str = ".crush-";

/// Sizes before and after a recompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savings {
    pub original_size: u64,
    pub new_size: u64,
}

impl Savings {
    pub fn new(original_size: u64, new_size: u64) -> Self {
        Self {
            original_size,
            new_size,
        }
    }

    pub fn saved_bytes(&self) -> u64 {
        self.original_size.saturating_sub(self.new_size)
    }

    /// Reduction relative to the original size, in percent.
    pub fn percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.saved_bytes() as f64 / self.original_size as f64 * 100.0
    }

    /// Whether the source was replaced by a smaller file.
    pub fn replaced(&self) -> bool {
        self.new_size < self.original_size
    }
}

impl fmt::Display for Savings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.replaced() {
            write!(
                f,
                "savings of {} (decreased by {:.2}%)",
                DecimalBytes(self.saved_bytes()),
                self.percent()
            )
        } else {
            write!(
                f,
                "no savings, kept original ({})",
                DecimalBytes(self.original_size)
            )
        }
    }
}

/// Recompress `src` in place with `tool`.
///
/// The source is only touched by the final rename, and only when the tool
/// succeeded and produced a smaller, non-empty file. Symlinks are resolved
/// first so the rename replaces the link target and the link itself survives.
pub async fn recompress(
    tool: &RecompressTool,
    src: &Path,
    interrupt: &CancelSignal,
) -> Result<Savings> {
    let resolved = tokio::fs::canonicalize(src)
        .await
        .with_context(|| format!("Failed to stat {}", src.display()))?;
    let src = resolved.as_path();

    let metadata = tokio::fs::metadata(src)
        .await
        .with_context(|| format!("Failed to stat {}", src.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a regular file", src.display());
    }
    let original_size = metadata.len();

    let tmp = create_sibling_temp(src)?;
    debug!(src = %src.display(), tmp = %tmp.display(), "created temporary file");

    tool.run(src, &tmp, interrupt).await?;

    let new_size = tokio::fs::metadata(&tmp)
        .await
        .with_context(|| format!("Failed to stat recompressed output {}", tmp.display()))?
        .len();
    if new_size == 0 {
        bail!("{} produced an empty file", tool.program().display());
    }

    let savings = Savings::new(original_size, new_size);
    if !savings.replaced() {
        debug!(src = %src.display(), original_size, new_size, "recompressed file is not smaller");
        return Ok(Savings::new(original_size, original_size));
    }

    tokio::fs::set_permissions(&tmp, metadata.permissions())
        .await
        .with_context(|| format!("Failed to copy permissions onto {}", tmp.display()))?;

    // On failure the TempPath comes back inside the error and is removed when dropped.
    tmp.persist(src)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", src.display()))?;

    Ok(savings)
}

/// A closed, empty temporary file in the same directory as `src`.
fn create_sibling_temp(src: &Path) -> Result<TempPath> {
    let dir = match src.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Quality;
    use crate::parallel::Interrupted;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_savings_report() {
        let savings = Savings::new(2_000_000, 1_500_000);
        assert_eq!(savings.saved_bytes(), 500_000);
        assert!((savings.percent() - 25.0).abs() < f64::EPSILON);
        assert!(savings.replaced());

        let line = savings.to_string();
        assert!(line.contains("500.00 kB"), "{line}");
        assert!(line.contains("decreased by 25.00%"), "{line}");
    }

    #[test]
    fn test_savings_without_reduction() {
        let savings = Savings::new(1000, 1000);
        assert_eq!(savings.saved_bytes(), 0);
        assert_eq!(savings.percent(), 0.0);
        assert!(!savings.replaced());
        assert!(savings.to_string().starts_with("no savings"));

        assert_eq!(Savings::new(0, 0).percent(), 0.0);
    }

    #[test]
    fn test_sibling_temp_lives_next_to_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("photo.jpg");

        let tmp = create_sibling_temp(&src).unwrap();
        assert_eq!(tmp.parent(), Some(dir.path()));
        assert!(
            tmp.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(TEMP_PREFIX)
        );

        let tmp_path = tmp.to_path_buf();
        drop(tmp);
        assert!(!tmp_path.exists());
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_temp_creation() {
        let dir = TempDir::new().unwrap();
        let tool = RecompressTool::new("jpeg-recompress", Quality::default());

        let err = recompress(&tool, &dir.path().join("gone.jpg"), &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to stat"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_directory_source_is_rejected() {
        let dir = TempDir::new().unwrap();
        let tool = RecompressTool::new("jpeg-recompress", Quality::default());

        let err = recompress(&tool, dir.path(), &CancelSignal::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        /// Write an executable shell script standing in for jpeg-recompress.
        /// It receives `--quality <level> <src> <dst>` as `$1..$4`.
        fn fake_tool(dir: &Path, body: &str) -> RecompressTool {
            let path = dir.join("fake-jpeg-recompress");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            RecompressTool::new(path, Quality::VeryHigh)
        }

        fn source(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
            let path = dir.join(name);
            let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            fs::write(&path, &bytes).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
            (path, bytes)
        }

        fn leftover_temps(dir: &Path) -> Vec<String> {
            fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(TEMP_PREFIX))
                .collect()
        }

        #[tokio::test]
        async fn test_smaller_output_replaces_source() {
            let tools = TempDir::new().unwrap();
            let photos = TempDir::new().unwrap();
            let tool = fake_tool(tools.path(), r#"head -c 1500000 "$3" > "$4""#);
            let (src, original) = source(photos.path(), "big.jpg", 2_000_000);

            let savings = recompress(&tool, &src, &CancelSignal::new()).await.unwrap();

            assert_eq!(savings, Savings::new(2_000_000, 1_500_000));
            assert_eq!(savings.saved_bytes(), 500_000);
            assert_eq!(format!("{:.2}", savings.percent()), "25.00");
            assert_eq!(fs::read(&src).unwrap(), &original[..1_500_000]);
            assert_eq!(
                fs::metadata(&src).unwrap().permissions().mode() & 0o777,
                0o644
            );
            assert!(leftover_temps(photos.path()).is_empty());
        }

        #[tokio::test]
        async fn test_symlinked_source_replaces_target_and_keeps_link() {
            let tools = TempDir::new().unwrap();
            let photos = TempDir::new().unwrap();
            let tool = fake_tool(tools.path(), r#"head -c 750 "$3" > "$4""#);
            let (real, original) = source(photos.path(), "real.jpg", 1000);
            let link = photos.path().join("link.jpg");
            std::os::unix::fs::symlink(&real, &link).unwrap();

            let savings = recompress(&tool, &link, &CancelSignal::new()).await.unwrap();

            assert_eq!(savings, Savings::new(1000, 750));
            assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
            assert_eq!(fs::read_link(&link).unwrap(), real);
            assert_eq!(fs::read(&real).unwrap(), &original[..750]);
            assert!(leftover_temps(photos.path()).is_empty());
        }

        #[tokio::test]
        async fn test_tool_failure_leaves_source_untouched() {
            let tools = TempDir::new().unwrap();
            let photos = TempDir::new().unwrap();
            let tool = fake_tool(
                tools.path(),
                "head -c 10 \"$3\" > \"$4\"\necho 'corrupt JPEG' >&2\nexit 1",
            );
            let (src, original) = source(photos.path(), "bad.jpg", 4096);

            let err = recompress(&tool, &src, &CancelSignal::new())
                .await
                .unwrap_err();

            let message = format!("{err:#}");
            assert!(message.contains("exited with"), "{message}");
            assert!(message.contains("corrupt JPEG"), "{message}");
            assert_eq!(fs::read(&src).unwrap(), original);
            assert!(leftover_temps(photos.path()).is_empty());
        }

        #[tokio::test]
        async fn test_larger_output_keeps_original() {
            let tools = TempDir::new().unwrap();
            let photos = TempDir::new().unwrap();
            let tool = fake_tool(tools.path(), r#"cat "$3" "$3" > "$4""#);
            let (src, original) = source(photos.path(), "tight.jpg", 1000);

            let savings = recompress(&tool, &src, &CancelSignal::new()).await.unwrap();

            assert!(!savings.replaced());
            assert_eq!(savings.saved_bytes(), 0);
            assert_eq!(fs::read(&src).unwrap(), original);
            assert!(leftover_temps(photos.path()).is_empty());
        }

        #[tokio::test]
        async fn test_empty_output_is_a_failure() {
            let tools = TempDir::new().unwrap();
            let photos = TempDir::new().unwrap();
            let tool = fake_tool(tools.path(), r#": > "$4""#);
            let (src, original) = source(photos.path(), "a.jpg", 500);

            let err = recompress(&tool, &src, &CancelSignal::new())
                .await
                .unwrap_err();

            assert!(err.to_string().contains("empty file"));
            assert_eq!(fs::read(&src).unwrap(), original);
            assert!(leftover_temps(photos.path()).is_empty());
        }

        #[tokio::test]
        async fn test_interrupt_kills_tool_and_cleans_up() {
            let tools = TempDir::new().unwrap();
            let photos = TempDir::new().unwrap();
            let tool = fake_tool(tools.path(), "sleep 30");
            let (src, original) = source(photos.path(), "slow.jpg", 2048);

            let interrupt = CancelSignal::new();
            let trigger = {
                let interrupt = interrupt.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    interrupt.cancel();
                })
            };

            let err = tokio::time::timeout(
                Duration::from_secs(10),
                recompress(&tool, &src, &interrupt),
            )
            .await
            .expect("interrupt should end the run promptly")
            .unwrap_err();
            trigger.await.unwrap();

            assert!(err.is::<Interrupted>());
            assert_eq!(fs::read(&src).unwrap(), original);
            assert!(leftover_temps(photos.path()).is_empty());
        }
    }
}
