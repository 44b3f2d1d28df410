use id3::TagLike;
use std::path::Path;

use super::{is_tag_target, read_tag, write_tag, PostProcessor, StageOutcome};
use crate::extractors::JobMetadata;
use crate::Result;

/// Fills title, artist, album and year when yt-dlp left them empty.
///
/// Existing tags are never overwritten.
#[derive(Debug, Default)]
pub struct MetadataRepair;

impl MetadataRepair {
    pub fn new() -> Self {
        Self
    }
}

impl PostProcessor for MetadataRepair {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn process(&self, audio: &Path, job: &JobMetadata) -> Result<StageOutcome> {
        if !is_tag_target(audio) {
            return Ok(StageOutcome::Skipped("not an mp3 file".into()));
        }

        let mut tag = read_tag(audio)?;
        let mut added = Vec::new();

        if tag.title().is_none() {
            if let Some(title) = job.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                tag.set_title(title);
                added.push("title");
            }
        }
        if tag.artist().is_none() {
            if let Some(artist) = job.artist() {
                tag.set_artist(artist);
                added.push("artist");
            }
        }
        if tag.album().is_none() {
            if let Some(album) = job.album_name() {
                tag.set_album(album);
                added.push("album");
            }
        }
        if tag.year().is_none() && tag.date_recorded().is_none() {
            if let Some(year) = job.year() {
                tag.set_year(year);
                added.push("year");
            }
        }

        if added.is_empty() {
            return Ok(StageOutcome::Skipped("tags already complete".into()));
        }

        write_tag(&tag, audio)?;
        Ok(StageOutcome::Applied(format!("added {}", added.join(", "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::test_support::write_untagged_mp3;
    use id3::Tag;
    use tempfile::TempDir;

    fn job() -> JobMetadata {
        JobMetadata {
            title: Some("T".into()),
            channel: Some("C".into()),
            upload_date: Some("20230115".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_fills_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_untagged_mp3(dir.path(), "song.mp3");

        let outcome = MetadataRepair::new().process(&path, &job()).unwrap();
        assert!(matches!(outcome, StageOutcome::Applied(_)));

        let tag = Tag::read_from_path(&path).unwrap();
        assert_eq!(tag.title(), Some("T"));
        assert_eq!(tag.artist(), Some("C"));
        assert_eq!(tag.album(), Some("C"));
        let year = tag.year().or_else(|| tag.date_recorded().map(|ts| ts.year));
        assert_eq!(year, Some(2023));
        assert_eq!(tag.frames().count(), 4);
    }

    #[test]
    fn test_never_clobbers_existing_tags() {
        let dir = TempDir::new().unwrap();
        let path = write_untagged_mp3(dir.path(), "song.mp3");
        let mut existing = Tag::new();
        existing.set_title("Original");
        existing.set_artist("Someone");
        existing.write_to_path(&path, id3::Version::Id3v23).unwrap();

        let outcome = MetadataRepair::new().process(&path, &job()).unwrap();
        assert_eq!(outcome, StageOutcome::Applied("added album, year".into()));

        let tag = Tag::read_from_path(&path).unwrap();
        assert_eq!(tag.title(), Some("Original"));
        assert_eq!(tag.artist(), Some("Someone"));
        assert_eq!(tag.album(), Some("C"));
    }

    #[test]
    fn test_complete_file_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = write_untagged_mp3(dir.path(), "song.mp3");
        MetadataRepair::new().process(&path, &job()).unwrap();
        let before = fs_err::read(&path).unwrap();

        let outcome = MetadataRepair::new().process(&path, &job()).unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(_)));
        assert_eq!(fs_err::read(&path).unwrap(), before);
    }

    #[test]
    fn test_ignores_non_audio_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs_err::write(&path, "hello").unwrap();

        let outcome = MetadataRepair::new().process(&path, &job()).unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(_)));
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "hello");
    }
}
