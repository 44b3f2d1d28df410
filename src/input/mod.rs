use anyhow::Context;
use std::path::Path;
use url::Url;

use crate::archive::ArchiveEntry;
use crate::{ArchiverError, Result};

/// Extractor name used for archive keys derived from YouTube URLs
pub const YOUTUBE_EXTRACTOR: &str = "youtube";

/// A single URL to download, read once from the input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// The URL exactly as written in the input file
    pub url: String,

    /// Video id derived from the URL, `None` when it cannot be derived
    pub id: Option<String>,
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let id = youtube_video_id(&url);
        Self { url, id }
    }

    /// Archive key for this item, if its id could be derived
    pub fn archive_entry(&self) -> Option<ArchiveEntry> {
        self.id
            .as_deref()
            .map(|id| ArchiveEntry::new(YOUTUBE_EXTRACTOR, id))
    }
}

/// Read URLs from a text file, one per line.
///
/// Blank lines and `#` comments are dropped; order and duplicates are kept.
pub fn read_urls(path: &Path) -> Result<Vec<WorkItem>> {
    if !path.is_file() {
        return Err(ArchiverError::InputNotFound(path.to_path_buf()).into());
    }

    let content = fs_err::read_to_string(path).context("Failed to read URL list")?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(WorkItem::new)
        .collect())
}

/// Extract the 11-character video id from the common YouTube URL shapes
pub fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let candidate = match host {
        "youtu.be" => parsed.path_segments()?.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" => {
            let mut segments = parsed.path_segments()?;
            match segments.next() {
                Some("watch") => parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }?;

    is_video_id(&candidate).then_some(candidate)
}

fn is_video_id(s: &str) -> bool {
    s.len() == 11
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
