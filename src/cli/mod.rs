use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;
use crate::extractors::AudioFormat;

#[derive(Parser)]
#[command(
    name = "yt2audio",
    about = "Download audio from video URLs with tags, cover art and synced lyrics",
    version,
    long_about = "Batch-download audio from YouTube (and anything else yt-dlp understands) on several worker threads. Missing tags and cover art are repaired after conversion, captions are embedded as LRC lyrics, and finished items are archived so reruns only fetch what is new."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./yt2audio.yaml or the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download every URL listed in a text file
    #[command(after_help = "Examples:
  yt2audio download input.txt
  yt2audio download input.txt -q 320 -o music/
  yt2audio download input.txt -f m4a --no-metadata --no-thumbnail
  yt2audio download input.txt --proxy socks5://127.0.0.1:1080 -t 5
  yt2audio download input.txt --naming \"%(channel)s - %(title)s\"")]
    Download(DownloadArgs),

    /// Write the video URLs of a channel or playlist to a text file
    Channel(ChannelArgs),

    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default configuration to the config path
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
}

/// Browsers yt-dlp can read cookies from
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Browser {
    Safari,
    Chrome,
    Firefox,
    Edge,
    Brave,
    Opera,
    Chromium,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Safari => "safari",
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
            Browser::Edge => "edge",
            Browser::Brave => "brave",
            Browser::Opera => "opera",
            Browser::Chromium => "chromium",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Netscape format cookies file
    #[arg(short, long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// Read cookies from a browser profile instead (overrides --cookies)
    #[arg(short, long, value_enum)]
    pub browser: Option<Browser>,

    /// Proxy URL (e.g. socks5://127.0.0.1:1080)
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Text file with URLs (one per line, # for comments)
    #[arg(value_name = "URLS_FILE")]
    pub urls: PathBuf,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Audio bitrate in kbps
    #[arg(short, long, value_parser = ["64", "96", "128", "192", "256", "320"])]
    pub quality: Option<String>,

    /// Audio format
    #[arg(short, long, value_enum)]
    pub format: Option<AudioFormat>,

    /// Number of worker threads
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: Option<u16>,

    /// Filename template, e.g. "%(channel)s - %(title)s" (also %(id)s, %(upload_date)s, ...)
    #[arg(long, value_name = "TEMPLATE")]
    pub naming: Option<String>,

    /// Caption languages to turn into lyrics, most preferred first
    #[arg(long, value_name = "LANGS", value_delimiter = ',')]
    pub sub_langs: Option<Vec<String>>,

    /// Skip embedding metadata (title, artist, etc.)
    #[arg(long)]
    pub no_metadata: bool,

    /// Skip embedding the thumbnail as cover art
    #[arg(long)]
    pub no_thumbnail: bool,

    /// Skip embedding lyrics from captions
    #[arg(long)]
    pub no_lyrics: bool,

    /// Disable the download archive (re-download everything)
    #[arg(long)]
    pub no_archive: bool,

    /// Max download rate in bytes/sec (e.g. 1000000 for ~1MB/s)
    #[arg(long, value_name = "BYTES")]
    pub limit_rate: Option<u64>,
}

impl DownloadArgs {
    /// Override configuration values with the flags given on the command line
    pub fn apply(&self, config: &mut Config) {
        let download = &mut config.download;
        if let Some(output) = &self.output {
            download.output_dir = output.clone();
        }
        if let Some(quality) = self.quality.as_deref().and_then(|q| q.parse().ok()) {
            download.quality = quality;
        }
        if let Some(format) = self.format {
            download.format = format;
        }
        if let Some(threads) = self.threads {
            download.threads = threads as usize;
        }
        if let Some(naming) = &self.naming {
            download.naming = naming.clone();
        }
        if let Some(langs) = &self.sub_langs {
            download.sub_langs = langs.iter().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
        }
        download.metadata &= !self.no_metadata;
        download.thumbnail &= !self.no_thumbnail;
        download.lyrics &= !self.no_lyrics;
        download.archive &= !self.no_archive;

        self.credentials.apply(config);
        if let Some(rate) = self.limit_rate {
            config.network.limit_rate = Some(rate);
        }
    }
}

impl CredentialArgs {
    pub fn apply(&self, config: &mut Config) {
        let network = &mut config.network;
        if let Some(cookies) = &self.cookies {
            network.cookies = Some(cookies.clone());
        }
        if let Some(browser) = self.browser {
            network.browser = Some(browser.as_str().to_string());
        }
        if let Some(proxy) = &self.proxy {
            network.proxy = Some(proxy.clone());
        }
    }
}

#[derive(Args, Debug, Clone)]
#[command(after_help = "Examples:
  yt2audio channel https://www.youtube.com/@ChannelName -o channel_urls.txt
  yt2audio channel https://www.youtube.com/@ChannelName -o urls.txt -n 50")]
pub struct ChannelArgs {
    /// Channel URL (@name or /channel/UCxxx) or playlist URL
    #[arg(value_name = "CHANNEL_URL")]
    pub channel: String,

    /// Output file for URLs
    #[arg(short, long, value_name = "FILE", default_value = "channel_urls.txt")]
    pub output: PathBuf,

    /// Max number of videos to list (0 = all)
    #[arg(short = 'n', long, default_value_t = 0)]
    pub max_count: usize,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}
