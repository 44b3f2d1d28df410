use anyhow::Context;
use id3::frame::{Picture, PictureType};
use id3::TagLike;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{is_tag_target, read_tag, write_tag, PostProcessor, StageOutcome};
use crate::extractors::JobMetadata;
use crate::Result;

/// Some image hosts refuse requests without a browser user agent
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches thumbnail bytes
#[cfg_attr(test, mockall::automock)]
pub trait ThumbnailFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher with a timeout and optional proxy
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT);

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }

        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }
}

impl ThumbnailFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send()?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download thumbnail: HTTP {}", response.status());
        }

        Ok(response.bytes()?.to_vec())
    }
}

/// Embeds the thumbnail as front cover when the file has no picture yet
pub struct CoverArtFallback {
    fetcher: Box<dyn ThumbnailFetcher>,
}

impl CoverArtFallback {
    pub fn new(fetcher: Box<dyn ThumbnailFetcher>) -> Self {
        Self { fetcher }
    }
}

impl PostProcessor for CoverArtFallback {
    fn name(&self) -> &'static str {
        "cover-art"
    }

    fn process(&self, audio: &Path, job: &JobMetadata) -> Result<StageOutcome> {
        if !is_tag_target(audio) {
            return Ok(StageOutcome::Skipped("not an mp3 file".into()));
        }

        let mut tag = read_tag(audio)?;
        if tag.pictures().next().is_some() {
            return Ok(StageOutcome::Skipped("cover already embedded".into()));
        }

        let Some(url) = job.thumbnail.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(StageOutcome::Skipped("no thumbnail url".into()));
        };

        let data = self.fetcher.fetch(url)?;
        if data.is_empty() {
            anyhow::bail!("thumbnail at {} is empty", url);
        }

        tag.add_frame(Picture {
            mime_type: mime_type_for(url).to_string(),
            picture_type: PictureType::CoverFront,
            description: "Cover".to_string(),
            data,
        });
        write_tag(&tag, audio)?;

        Ok(StageOutcome::Applied("embedded cover".into()))
    }
}

/// Image MIME type from the URL's extension, JPEG when unknown
pub fn mime_type_for(url: &str) -> &'static str {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());

    match Path::new(&path).extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::test_support::write_untagged_mp3;
    use id3::Tag;
    use tempfile::TempDir;

    fn job_with_thumbnail(url: &str) -> JobMetadata {
        JobMetadata {
            thumbnail: Some(url.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("https://i.ytimg.com/vi/x/maxresdefault.jpg"), "image/jpeg");
        assert_eq!(mime_type_for("https://i.ytimg.com/vi_webp/x/maxresdefault.webp?v=1"), "image/webp");
        assert_eq!(mime_type_for("https://example.com/cover.PNG"), "image/png");
        assert_eq!(mime_type_for("https://example.com/cover"), "image/jpeg");
    }

    #[test]
    fn test_embeds_fetched_cover() {
        let dir = TempDir::new().unwrap();
        let path = write_untagged_mp3(dir.path(), "song.mp3");

        let mut fetcher = MockThumbnailFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url| url == "https://example.com/thumb.png")
            .times(1)
            .returning(|_| Ok(vec![0x89, 0x50, 0x4E, 0x47]));

        let stage = CoverArtFallback::new(Box::new(fetcher));
        let outcome = stage
            .process(&path, &job_with_thumbnail("https://example.com/thumb.png"))
            .unwrap();
        assert!(matches!(outcome, StageOutcome::Applied(_)));

        let tag = Tag::read_from_path(&path).unwrap();
        let picture = tag.pictures().next().unwrap();
        assert_eq!(picture.mime_type, "image/png");
        assert_eq!(picture.picture_type, PictureType::CoverFront);
        assert_eq!(picture.data, vec![0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_existing_cover_means_no_request() {
        let dir = TempDir::new().unwrap();
        let path = write_untagged_mp3(dir.path(), "song.mp3");
        let mut tag = Tag::new();
        tag.add_frame(Picture {
            mime_type: "image/jpeg".into(),
            picture_type: PictureType::CoverFront,
            description: String::new(),
            data: vec![0xFF, 0xD8, 0xFF],
        });
        tag.write_to_path(&path, id3::Version::Id3v23).unwrap();

        let mut fetcher = MockThumbnailFetcher::new();
        fetcher.expect_fetch().times(0);

        let stage = CoverArtFallback::new(Box::new(fetcher));
        let outcome = stage
            .process(&path, &job_with_thumbnail("https://example.com/thumb.jpg"))
            .unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(_)));
    }

    #[test]
    fn test_fetch_failure_is_an_error_and_leaves_file() {
        let dir = TempDir::new().unwrap();
        let path = write_untagged_mp3(dir.path(), "song.mp3");
        let before = fs_err::read(&path).unwrap();

        let mut fetcher = MockThumbnailFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(anyhow::anyhow!("timed out")));

        let stage = CoverArtFallback::new(Box::new(fetcher));
        assert!(stage
            .process(&path, &job_with_thumbnail("https://example.com/thumb.jpg"))
            .is_err());
        assert_eq!(fs_err::read(&path).unwrap(), before);
    }

    #[test]
    fn test_no_thumbnail_url() {
        let dir = TempDir::new().unwrap();
        let path = write_untagged_mp3(dir.path(), "song.mp3");

        let mut fetcher = MockThumbnailFetcher::new();
        fetcher.expect_fetch().times(0);

        let stage = CoverArtFallback::new(Box::new(fetcher));
        let outcome = stage.process(&path, &JobMetadata::default()).unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(_)));
    }
}
