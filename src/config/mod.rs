use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extractors::ytdlp::YtDlpTool;
use crate::extractors::{AudioFormat, DownloadOptions};
use crate::utils::mask_proxy_password;
use crate::ArchiverError;

/// Bitrates yt-dlp is asked for
pub const SUPPORTED_QUALITIES: [u32; 6] = [64, 96, 128, 192, 256, 320];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What to download and how to post-process it
    pub download: DownloadConfig,

    /// Proxy, credentials and rate limits
    pub network: NetworkConfig,

    /// External tools
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,

    pub format: AudioFormat,

    /// Audio bitrate in kbps
    pub quality: u32,

    /// yt-dlp output template without extension
    pub naming: String,

    /// Worker threads
    pub threads: usize,

    /// Caption languages for lyrics, most preferred first
    pub sub_langs: Vec<String>,

    pub metadata: bool,
    pub thumbnail: bool,
    pub lyrics: bool,

    /// Skip items recorded in `<output_dir>/.archive.txt`
    pub archive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub proxy: Option<String>,

    /// Bytes per second
    pub limit_rate: Option<u64>,

    /// Netscape cookies file
    pub cookies: Option<PathBuf>,

    /// Browser profile to read cookies from; overrides `cookies`
    pub browser: Option<String>,

    pub thumbnail_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: String,

    /// ffmpeg binary or its directory
    pub ffmpeg_location: Option<PathBuf>,

    /// Passed to yt-dlp verbatim
    pub extra_args: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            format: AudioFormat::Mp3,
            quality: 128,
            naming: "%(title)s".to_string(),
            threads: 3,
            sub_langs: ["zh-Hans", "zh-Hant", "zh", "en"].iter().map(|s| s.to_string()).collect(),
            metadata: true,
            thumbnail: true,
            lyrics: true,
            archive: true,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            limit_rate: None,
            cookies: None,
            browser: None,
            thumbnail_timeout_secs: 15,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg_location: None,
            extra_args: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from `explicit`, the usual locations, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ArchiverError::InputNotFound(path.to_path_buf()).into());
            }
            return Self::load_from(path);
        }

        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("yt2audio.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("yt2audio").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.download.threads == 0 {
            return Err(ArchiverError::InvalidConfig("threads must be at least 1".into()).into());
        }

        if !SUPPORTED_QUALITIES.contains(&self.download.quality) {
            return Err(ArchiverError::InvalidConfig(format!(
                "unsupported quality {}kbps (choose one of {:?})",
                self.download.quality, SUPPORTED_QUALITIES
            ))
            .into());
        }

        if self.download.naming.trim().is_empty() {
            return Err(ArchiverError::InvalidConfig("naming template is empty".into()).into());
        }

        Ok(())
    }

    /// Where the completion archive lives
    pub fn archive_path(&self) -> PathBuf {
        self.download.output_dir.join(crate::archive::ARCHIVE_FILE_NAME)
    }

    pub fn thumbnail_timeout(&self) -> Duration {
        Duration::from_secs(self.network.thumbnail_timeout_secs)
    }

    /// The downloader settings every worker is configured with
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            output_dir: self.download.output_dir.clone(),
            naming: self.download.naming.clone(),
            format: self.download.format,
            quality: self.download.quality,
            cookies: self.network.cookies.clone(),
            browser: self.network.browser.clone(),
            proxy: self.network.proxy.clone(),
            limit_rate: self.network.limit_rate,
            sub_langs: if self.download.lyrics {
                self.download.sub_langs.clone()
            } else {
                Vec::new()
            },
            embed_metadata: self.download.metadata,
            embed_thumbnail: self.download.thumbnail,
            continue_on_error: true,
        }
    }

    pub fn yt_dlp_tool(&self) -> YtDlpTool {
        YtDlpTool {
            yt_dlp_path: self.tools.yt_dlp.clone(),
            ffmpeg_location: self.tools.ffmpeg_location.clone(),
            extra_args: self.tools.extra_args.clone(),
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        let yes_no = |b: bool| if b { "yes" } else { "no" };

        println!("Current Configuration:");
        println!("  Output:     {}/", self.download.output_dir.display());
        println!("  Format:     {} @ {}kbps", self.download.format, self.download.quality);
        println!("  Naming:     {}", self.download.naming);
        println!("  Threads:    {}", self.download.threads);
        println!("  Sub langs:  {}", self.download.sub_langs.join(", "));
        println!("  Metadata:   {}", yes_no(self.download.metadata));
        println!("  Thumbnail:  {}", yes_no(self.download.thumbnail));
        println!("  Lyrics:     {}", yes_no(self.download.lyrics));
        println!("  Archive:    {}", yes_no(self.download.archive));
        if let Some(proxy) = &self.network.proxy {
            println!("  Proxy:      {}", mask_proxy_password(proxy));
        }
        if let Some(rate) = self.network.limit_rate {
            println!("  Rate limit: {} bytes/s", rate);
        }
        if let Some(browser) = &self.network.browser {
            println!("  Cookies:    {} browser", browser);
        } else if let Some(cookies) = &self.network.cookies {
            println!("  Cookies:    {}", cookies.display());
        }
        println!("  yt-dlp:     {}", self.tools.yt_dlp);
        if let Some(ffmpeg) = &self.tools.ffmpeg_location {
            println!("  ffmpeg:     {}", ffmpeg.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.archive_path(), PathBuf::from("output").join(".archive.txt"));
        assert_eq!(config.thumbnail_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(
            &path,
            "download:\n  format: opus\n  threads: 8\nnetwork:\n  proxy: socks5://127.0.0.1:1080\ntools:\n  extra_args: [\"--remote-components\", \"ejs:github\"]\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.download.format, AudioFormat::Opus);
        assert_eq!(config.download.threads, 8);
        assert_eq!(config.download.quality, 128);
        assert_eq!(config.network.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.network.thumbnail_timeout_secs, 15);
        assert_eq!(config.tools.extra_args.len(), 2);
    }

    #[test]
    fn test_lyrics_off_disables_caption_download() {
        let mut config = Config::default();
        assert_eq!(config.download_options().sub_langs.len(), 4);

        config.download.lyrics = false;
        assert!(config.download_options().sub_langs.is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.download.threads = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.download.quality = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.download.naming = "%(channel)s - %(title)s".into();
        config.save(&path).unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.download.naming, "%(channel)s - %(title)s");
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        assert!(Config::load(Some(Path::new("/no/such/config.yaml"))).is_err());
    }
}
