//! yt2audio - batch audio downloader with tag repair and synced lyrics
//!
//! This library reads a list of video URLs, downloads each one as a tagged audio file through
//! yt-dlp on a pool of worker threads, and repairs the result afterwards: missing tags, missing
//! cover art and lyrics converted from caption tracks. Completed items are kept in an
//! append-only archive so reruns skip finished work.

pub mod archive;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod extractors;
pub mod input;
pub mod lyrics;
pub mod postprocess;
pub mod utils;

pub use archive::{Archive, ArchiveEntry};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use coordinator::{BatchPlan, BatchSummary, Coordinator};
pub use extractors::{DownloadOptions, JobMetadata, MediaDownloader};
pub use input::{read_urls, WorkItem};
pub use lyrics::LyricsDocument;
pub use postprocess::{PostProcessor, StageOutcome};

use std::path::PathBuf;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the downloader
#[derive(thiserror::Error, Debug)]
pub enum ArchiverError {
    #[error("file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("cookies file not found: {}", .0.display())]
    CredentialsNotFound(PathBuf),

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
