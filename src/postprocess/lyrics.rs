use anyhow::Context;
use id3::frame::Lyrics;
use id3::TagLike;
use std::path::{Path, PathBuf};

use super::{is_tag_target, read_tag, write_tag, PostProcessor, StageOutcome};
use crate::extractors::JobMetadata;
use crate::lyrics::LyricsDocument;
use crate::Result;

const CAPTION_EXTENSIONS: [&str; 2] = ["vtt", "srt"];

/// Turns the downloaded caption track into an embedded LRC lyrics frame.
///
/// Caption files next to the audio are always removed once this stage runs.
#[derive(Debug, Clone, Default)]
pub struct LyricsEmbed {
    languages: Vec<String>,
}

impl LyricsEmbed {
    /// `languages` in preference order, e.g. `["zh-Hans", "en"]`
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }

    fn embed(&self, audio: &Path, candidates: &[PathBuf]) -> Result<StageOutcome> {
        if !is_tag_target(audio) {
            return Ok(StageOutcome::Skipped("not an mp3 file".into()));
        }

        let mut tag = read_tag(audio)?;
        if tag.lyrics().next().is_some() {
            return Ok(StageOutcome::Skipped("lyrics already embedded".into()));
        }

        let Some(stem) = file_stem(audio) else {
            return Ok(StageOutcome::Skipped("audio file has no name".into()));
        };
        let Some(selected) = select_caption(candidates, &self.languages, &stem) else {
            return Ok(StageOutcome::Skipped("no caption track".into()));
        };

        let raw = fs_err::read(selected).context("Failed to read caption track")?;
        let document = LyricsDocument::from_captions(&String::from_utf8_lossy(&raw));
        if document.is_empty() {
            return Ok(StageOutcome::Skipped("caption track has no cues".into()));
        }

        let language = caption_language(selected, &stem).unwrap_or_default();
        tag.add_frame(Lyrics {
            lang: lyrics_language_code(&language).to_string(),
            description: String::new(),
            text: document.to_string(),
        });
        write_tag(&tag, audio)?;

        Ok(StageOutcome::Applied(format!(
            "embedded {} lyric lines from {}",
            document.len(),
            selected.display()
        )))
    }
}

impl PostProcessor for LyricsEmbed {
    fn name(&self) -> &'static str {
        "lyrics"
    }

    fn process(&self, audio: &Path, _job: &JobMetadata) -> Result<StageOutcome> {
        let candidates = caption_candidates(audio)?;
        if candidates.is_empty() {
            return Ok(StageOutcome::Skipped("no caption files".into()));
        }

        let result = self.embed(audio, &candidates);

        for caption in &candidates {
            if let Err(e) = fs_err::remove_file(caption) {
                tracing::warn!("Failed to remove caption file: {}", e);
            }
        }

        result
    }
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Caption files sharing the audio file's base name, sorted by name
pub fn caption_candidates(audio: &Path) -> Result<Vec<PathBuf>> {
    let Some(stem) = file_stem(audio) else {
        return Ok(Vec::new());
    };
    let dir = match audio.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut candidates: Vec<PathBuf> = fs_err::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| caption_suffix(path, &stem).is_some())
        .collect();

    candidates.sort();
    Ok(candidates)
}

/// For a caption named exactly `<stem>.<ext>` or `<stem>.<lang>.<ext>`, its optional language.
///
/// `Song. Live.en.vtt` is not a caption of `Song.mp3`: it belongs to `Song. Live.mp3`.
fn caption_suffix(caption: &Path, stem: &str) -> Option<Option<String>> {
    let name = caption.file_name()?.to_string_lossy().into_owned();
    let rest = name.strip_prefix(stem)?.strip_prefix('.')?;

    let (language, ext) = match rest.rsplit_once('.') {
        Some((language, ext)) => (Some(language), ext),
        None => (None, rest),
    };
    if !CAPTION_EXTENSIONS.iter().any(|c| ext.eq_ignore_ascii_case(c)) {
        return None;
    }

    match language {
        None => Some(None),
        Some(tag) if is_language_tag(tag) => Some(Some(tag.to_string())),
        Some(_) => None,
    }
}

/// `en`, `zh-Hans`, `pt_BR`: letters, digits, `-` and `_` only
fn is_language_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Language tag between the base name and the extension: `Song.zh-Hans.vtt` -> `zh-Hans`
pub fn caption_language(caption: &Path, stem: &str) -> Option<String> {
    caption_suffix(caption, stem).flatten()
}

/// First caption whose language matches the earliest preference, else the first caption
pub fn select_caption<'a>(candidates: &'a [PathBuf], languages: &[String], stem: &str) -> Option<&'a PathBuf> {
    let matches = |caption: &Path, wanted: &str| {
        caption_language(caption, stem).is_some_and(|lang| {
            let lang = lang.to_lowercase();
            let wanted = wanted.to_lowercase();
            lang == wanted || lang.starts_with(&format!("{}-", wanted))
        })
    };

    languages
        .iter()
        .find_map(|wanted| candidates.iter().find(|c| matches(c.as_path(), wanted.as_str())))
        .or_else(|| candidates.first())
}

/// ISO 639-2 code for the lyrics frame: Chinese for `zh*` tags, English otherwise
pub fn lyrics_language_code(language: &str) -> &'static str {
    if language.to_lowercase().starts_with("zh") {
        "chi"
    } else {
        "eng"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::test_support::write_untagged_mp3;
    use id3::Tag;
    use tempfile::TempDir;

    const VTT: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHello\n\n00:00:02.000 --> 00:00:03.000\nHello\n\n00:01:05.250 --> 00:01:06.000\nAgain\n";

    fn langs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_caption_language() {
        let stem = "My Song.live";
        assert_eq!(
            caption_language(Path::new("/x/My Song.live.zh-Hans.vtt"), stem),
            Some("zh-Hans".to_string())
        );
        assert_eq!(caption_language(Path::new("/x/My Song.live.vtt"), stem), None);
        assert_eq!(caption_language(Path::new("/x/Other.en.vtt"), stem), None);
        assert_eq!(caption_language(Path::new("/x/My Song.live. Acoustic.en.vtt"), stem), None);
    }

    #[test]
    fn test_captions_of_a_longer_sibling_title_are_not_candidates() {
        let dir = TempDir::new().unwrap();
        let audio = write_untagged_mp3(dir.path(), "Song.mp3");
        fs_err::write(dir.path().join("Song. Live.en.vtt"), VTT).unwrap();
        fs_err::write(dir.path().join("Song. Live.vtt"), VTT).unwrap();
        fs_err::write(dir.path().join("Song.en.txt"), VTT).unwrap();

        assert!(caption_candidates(&audio).unwrap().is_empty());

        let outcome = LyricsEmbed::new(langs(&["zh"]))
            .process(&audio, &JobMetadata::default())
            .unwrap();
        assert_eq!(outcome, StageOutcome::Skipped("no caption files".into()));
        assert!(dir.path().join("Song. Live.en.vtt").exists());
        assert!(dir.path().join("Song. Live.vtt").exists());
    }

    #[test]
    fn test_caption_candidates_accept_plain_and_tagged_names() {
        let dir = TempDir::new().unwrap();
        let audio = write_untagged_mp3(dir.path(), "Song.mp3");
        fs_err::write(dir.path().join("Song.vtt"), VTT).unwrap();
        fs_err::write(dir.path().join("Song.pt_BR.SRT"), VTT).unwrap();
        fs_err::write(dir.path().join("Song.zh-Hans.vtt"), VTT).unwrap();

        let names: Vec<String> = caption_candidates(&audio)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Song.pt_BR.SRT", "Song.vtt", "Song.zh-Hans.vtt"]);
    }

    #[test]
    fn test_select_caption_by_preference() {
        let candidates = vec![
            PathBuf::from("S.en.vtt"),
            PathBuf::from("S.ja.vtt"),
            PathBuf::from("S.zh-Hant.vtt"),
        ];

        let selected = select_caption(&candidates, &langs(&["zh-Hans", "zh", "en"]), "S");
        assert_eq!(selected, Some(&PathBuf::from("S.zh-Hant.vtt")));

        let selected = select_caption(&candidates, &langs(&["en", "zh"]), "S");
        assert_eq!(selected, Some(&PathBuf::from("S.en.vtt")));

        let selected = select_caption(&candidates, &langs(&["ko"]), "S");
        assert_eq!(selected, Some(&PathBuf::from("S.en.vtt")));

        assert_eq!(select_caption(&[], &langs(&["en"]), "S"), None);
    }

    #[test]
    fn test_lyrics_language_code() {
        assert_eq!(lyrics_language_code("zh-Hans"), "chi");
        assert_eq!(lyrics_language_code("ZH"), "chi");
        assert_eq!(lyrics_language_code("en"), "eng");
        assert_eq!(lyrics_language_code("ja"), "eng");
    }

    #[test]
    fn test_embeds_preferred_track_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let audio = write_untagged_mp3(dir.path(), "Song.mp3");
        fs_err::write(dir.path().join("Song.en.vtt"), "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nEnglish\n").unwrap();
        fs_err::write(dir.path().join("Song.zh-Hans.vtt"), VTT).unwrap();
        fs_err::write(dir.path().join("Other.en.vtt"), VTT).unwrap();

        let stage = LyricsEmbed::new(langs(&["zh-Hans", "en"]));
        let outcome = stage.process(&audio, &JobMetadata::default()).unwrap();
        assert!(matches!(outcome, StageOutcome::Applied(_)));

        let tag = Tag::read_from_path(&audio).unwrap();
        let lyrics = tag.lyrics().next().unwrap();
        assert_eq!(lyrics.lang, "chi");
        assert_eq!(lyrics.text, "[00:01.00]Hello\n[01:05.25]Again");

        assert!(!dir.path().join("Song.en.vtt").exists());
        assert!(!dir.path().join("Song.zh-Hans.vtt").exists());
        assert!(dir.path().join("Other.en.vtt").exists());
    }

    #[test]
    fn test_existing_lyrics_are_kept_but_captions_removed() {
        let dir = TempDir::new().unwrap();
        let audio = write_untagged_mp3(dir.path(), "Song.mp3");
        let mut tag = Tag::new();
        tag.add_frame(Lyrics {
            lang: "eng".into(),
            description: String::new(),
            text: "already here".into(),
        });
        tag.write_to_path(&audio, id3::Version::Id3v23).unwrap();
        fs_err::write(dir.path().join("Song.en.srt"), "1\n00:00:01,000 --> 00:00:02,000\nNew\n").unwrap();

        let outcome = LyricsEmbed::new(langs(&["en"]))
            .process(&audio, &JobMetadata::default())
            .unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(_)));

        let tag = Tag::read_from_path(&audio).unwrap();
        assert_eq!(tag.lyrics().count(), 1);
        assert_eq!(tag.lyrics().next().unwrap().text, "already here");
        assert!(!dir.path().join("Song.en.srt").exists());
    }

    #[test]
    fn test_empty_caption_track_embeds_nothing() {
        let dir = TempDir::new().unwrap();
        let audio = write_untagged_mp3(dir.path(), "Song.mp3");
        fs_err::write(dir.path().join("Song.en.vtt"), "WEBVTT\n\n").unwrap();

        let outcome = LyricsEmbed::new(langs(&["en"]))
            .process(&audio, &JobMetadata::default())
            .unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(_)));
        assert!(matches!(
            Tag::read_from_path(&audio).map_err(|e| e.kind),
            Err(id3::ErrorKind::NoTag)
        ));
        assert!(!dir.path().join("Song.en.vtt").exists());
    }

    #[test]
    fn test_no_captions_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let audio = write_untagged_mp3(dir.path(), "Song.mp3");

        let outcome = LyricsEmbed::new(langs(&["en"]))
            .process(&audio, &JobMetadata::default())
            .unwrap();
        assert_eq!(outcome, StageOutcome::Skipped("no caption files".into()));
    }
}
