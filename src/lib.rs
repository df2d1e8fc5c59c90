//! # Crush - in-place JPEG recompression
//!
//! Crush runs `jpeg-recompress` over a set of JPEG files and replaces each
//! original with the recompressed output when it is smaller.
//!
//! ## Features
//!
//! - **Bounded parallelism**: one task per file, at most one running recompression per CPU
//! - **Fail fast**: the first failure stops new files from starting
//! - **Crash safe**: output goes to a temporary file next to the source and is
//!   renamed over it atomically, so an interrupted run never leaves a half-written image
//!
//! ## Quick Start
//!
//! ```bash
//! # Recompress every JPEG in the current directory
//! crush
//!
//! # Recompress specific files with four workers
//! crush -j 4 holiday/*.jpg
//! ```

pub mod cli;
pub mod config;
pub mod parallel;
pub mod recompress;
pub mod source;

pub use cli::{Cli, Output};
pub use config::CrushConfig;

/// Result type alias for Crush operations
pub type Result<T> = anyhow::Result<T>;
