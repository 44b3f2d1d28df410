use anyhow::Context;
use id3::{ErrorKind, Tag, Version};
use std::path::Path;

pub mod cover_art;
pub mod lyrics;
pub mod metadata;

pub use cover_art::{CoverArtFallback, HttpFetcher, ThumbnailFetcher};
pub use lyrics::LyricsEmbed;
pub use metadata::MetadataRepair;

use crate::extractors::JobMetadata;
use crate::Result;

/// What a stage did to a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The file was changed
    Applied(String),

    /// Nothing to do, with the reason
    Skipped(String),
}

/// A repair step run on every finished audio file
pub trait PostProcessor: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Inspect and possibly modify `audio` using what the download reported
    fn process(&self, audio: &Path, job: &JobMetadata) -> Result<StageOutcome>;
}

/// Run `stages` in order on one file.
///
/// A failing stage is logged and skipped; it never fails the item.
pub fn run_stages(stages: &[Box<dyn PostProcessor>], audio: &Path, job: &JobMetadata) -> Vec<StageOutcome> {
    let mut outcomes = Vec::with_capacity(stages.len());

    for stage in stages {
        match stage.process(audio, job) {
            Ok(outcome) => {
                match &outcome {
                    StageOutcome::Applied(what) => {
                        tracing::debug!("{}: {} ({})", stage.name(), what, audio.display())
                    }
                    StageOutcome::Skipped(why) => {
                        tracing::debug!("{} skipped: {} ({})", stage.name(), why, audio.display())
                    }
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                tracing::warn!("{} failed for {}: {:#}", stage.name(), audio.display(), e);
                outcomes.push(StageOutcome::Skipped(format!("failed: {:#}", e)));
            }
        }
    }

    outcomes
}

/// Files whose tags we edit: ID3-tagged MP3s
pub fn is_tag_target(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"))
}

/// Read the file's ID3 tag, or start an empty one when it has none
pub fn read_tag(path: &Path) -> Result<Tag> {
    match Tag::read_from_path(path) {
        Ok(tag) => Ok(tag),
        Err(e) if matches!(e.kind, ErrorKind::NoTag) => Ok(Tag::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read tags of {}", path.display())),
    }
}

pub fn write_tag(tag: &Tag, path: &Path) -> Result<()> {
    tag.write_to_path(path, Version::Id3v23)
        .with_context(|| format!("Failed to write tags to {}", path.display()))
}
