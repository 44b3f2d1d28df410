use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod ytdlp;

pub use ytdlp::YtDlp;

use crate::archive::ArchiveEntry;
use crate::Result;

/// Metadata yt-dlp reports for one produced file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobMetadata {
    /// Video id
    pub id: Option<String>,

    /// Extractor that produced the file (e.g. `Youtube`)
    pub extractor_key: Option<String>,

    pub title: Option<String>,

    /// Channel display name
    pub channel: Option<String>,

    pub uploader: Option<String>,

    /// Explicit album, set for music uploads
    pub album: Option<String>,

    /// Upload date as `YYYYMMDD`
    pub upload_date: Option<String>,

    /// Final path of the audio file after conversion
    pub filepath: Option<PathBuf>,

    /// Thumbnail URL
    pub thumbnail: Option<String>,

    /// Page of this entry; differs from the requested URL for playlist entries
    pub webpage_url: Option<String>,
}

impl JobMetadata {
    /// Artist: channel, else uploader
    pub fn artist(&self) -> Option<&str> {
        non_empty(&self.channel).or_else(|| non_empty(&self.uploader))
    }

    /// Album: explicit album, else channel, else uploader
    pub fn album_name(&self) -> Option<&str> {
        non_empty(&self.album).or_else(|| self.artist())
    }

    /// Release year from the first four characters of the upload date
    pub fn year(&self) -> Option<i32> {
        let date = non_empty(&self.upload_date)?;
        date.get(..4)?.parse().ok()
    }

    /// The entry's own page, else `requested` (the URL the item was queued with)
    pub fn page_url<'a>(&'a self, requested: &'a str) -> &'a str {
        non_empty(&self.webpage_url).unwrap_or(requested)
    }

    /// Archive key for the produced file
    pub fn archive_entry(&self) -> Option<ArchiveEntry> {
        let extractor = non_empty(&self.extractor_key)?;
        let id = non_empty(&self.id)?;
        Some(ArchiveEntry::new(extractor, id))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Target audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Opus,
    Flac,
    Wav,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a downloader needs to know, fixed for a whole batch
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub output_dir: PathBuf,
    pub naming: String,
    pub format: AudioFormat,

    /// Bitrate in kbps
    pub quality: u32,

    pub cookies: Option<PathBuf>,

    /// Browser to read cookies from; wins over `cookies`
    pub browser: Option<String>,

    pub proxy: Option<String>,

    /// Bytes per second
    pub limit_rate: Option<u64>,

    /// Caption languages, most preferred first; empty disables caption download
    pub sub_langs: Vec<String>,

    pub embed_metadata: bool,
    pub embed_thumbnail: bool,

    /// Keep going inside a playlist when one entry fails
    pub continue_on_error: bool,
}

impl DownloadOptions {
    /// `<output_dir>/<naming>.%(ext)s`
    pub fn output_template(&self) -> String {
        self.output_dir
            .join(format!("{}.%(ext)s", self.naming))
            .to_string_lossy()
            .into_owned()
    }
}

/// One download engine instance; each worker owns its own
pub trait MediaDownloader: Send {
    /// Download and convert everything behind `url`, returning one entry per produced file
    fn download(&mut self, url: &str) -> Result<Vec<JobMetadata>>;
}
