use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use super::{DownloadOptions, JobMetadata, MediaDownloader};
use crate::{ArchiverError, Result};

/// Location and pass-through flags of the yt-dlp binary
#[derive(Debug, Clone)]
pub struct YtDlpTool {
    pub yt_dlp_path: String,

    /// Passed as `--ffmpeg-location`
    pub ffmpeg_location: Option<PathBuf>,

    pub extra_args: Vec<String>,
}

impl Default for YtDlpTool {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_location: None,
            extra_args: Vec::new(),
        }
    }
}

impl YtDlpTool {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.yt_dlp_path);
        if let Some(location) = &self.ffmpeg_location {
            cmd.arg("--ffmpeg-location").arg(location);
        }
        cmd.args(&self.extra_args);
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<Output> {
        tracing::debug!("Running {:?}", cmd);

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ArchiverError::ToolFailed {
                tool: self.yt_dlp_path.clone(),
                message: e.to_string(),
            })?;

        Ok(output)
    }
}

/// Audio downloader backed by one yt-dlp invocation per URL
pub struct YtDlp {
    tool: YtDlpTool,
    options: DownloadOptions,
}

impl YtDlp {
    pub fn new(tool: YtDlpTool, options: DownloadOptions) -> Self {
        Self { tool, options }
    }

    /// Arguments for downloading `url`, excluding the binary itself
    pub fn download_args(&self, url: &str) -> Vec<String> {
        let opts = &self.options;
        let mut args: Vec<String> = vec![
            "--format".into(),
            "bestaudio/best".into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            opts.format.as_str().into(),
            "--audio-quality".into(),
            format!("{}K", opts.quality),
            "--output".into(),
            opts.output_template(),
            "--no-progress".into(),
            // Print the final info JSON of every produced file.
            "--no-simulate".into(),
            "--print".into(),
            "after_move:%()j".into(),
        ];

        if opts.continue_on_error {
            args.push("--no-abort-on-error".into());
        }
        if opts.embed_metadata {
            args.push("--embed-metadata".into());
        }
        if opts.embed_thumbnail {
            args.push("--embed-thumbnail".into());
        }
        if !opts.sub_langs.is_empty() {
            args.extend([
                "--write-subs".into(),
                "--write-auto-subs".into(),
                "--sub-langs".into(),
                opts.sub_langs.join(","),
                "--sub-format".into(),
                "vtt/srt/best".into(),
            ]);
        }
        args.extend(credential_args(opts.cookies.as_ref(), opts.browser.as_deref()));
        if let Some(proxy) = &opts.proxy {
            args.extend(["--proxy".into(), proxy.clone()]);
        }
        if let Some(rate) = opts.limit_rate {
            args.extend(["--limit-rate".into(), rate.to_string()]);
        }

        args.push(url.to_string());
        args
    }
}

impl MediaDownloader for YtDlp {
    fn download(&mut self, url: &str) -> Result<Vec<JobMetadata>> {
        let mut cmd = self.tool.command();
        cmd.args(self.download_args(url));
        let output = self.tool.run(cmd)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let jobs = parse_info_lines(&stdout);

        if !output.status.success() {
            let message = last_error_line(&output.stderr);
            if jobs.is_empty() {
                return Err(ArchiverError::ToolFailed {
                    tool: self.tool.yt_dlp_path.clone(),
                    message,
                }
                .into());
            }
            tracing::warn!("yt-dlp reported errors for {}: {}", url, message);
        }

        Ok(jobs)
    }
}

/// Parse the `--print after_move:%()j` lines; other output is ignored
pub fn parse_info_lines(stdout: &str) -> Vec<JobMetadata> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<JobMetadata>(line) {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::warn!("Skipping unparsable yt-dlp info line: {}", e);
                None
            }
        })
        .collect()
}

fn last_error_line(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR"))
        .or_else(|| text.lines().rev().map(str::trim).find(|line| !line.is_empty()))
        .unwrap_or("exited with an error")
        .to_string()
}

fn credential_args(cookies: Option<&PathBuf>, browser: Option<&str>) -> Vec<String> {
    match (browser, cookies) {
        (Some(browser), _) => vec!["--cookies-from-browser".into(), browser.to_string()],
        (None, Some(path)) => vec!["--cookies".into(), path.to_string_lossy().into_owned()],
        (None, None) => Vec::new(),
    }
}

/// Options for listing a channel's videos
#[derive(Debug, Clone, Default)]
pub struct ChannelQuery {
    pub cookies: Option<PathBuf>,
    pub browser: Option<String>,
    pub proxy: Option<String>,

    /// 0 lists everything
    pub max_count: usize,
}

/// List the watch URLs of every video on a channel or playlist page
pub fn list_channel_videos(tool: &YtDlpTool, channel_url: &str, query: &ChannelQuery) -> Result<Vec<String>> {
    let mut cmd = tool.command();
    cmd.args(["--flat-playlist", "--quiet", "--no-warnings", "--print", "id"]);
    cmd.args(credential_args(query.cookies.as_ref(), query.browser.as_deref()));
    if let Some(proxy) = &query.proxy {
        cmd.args(["--proxy", proxy.as_str()]);
    }
    if query.max_count > 0 {
        cmd.arg("--playlist-end").arg(query.max_count.to_string());
    }
    cmd.arg(channel_url);

    let output = tool.run(cmd)?;
    if !output.status.success() {
        return Err(ArchiverError::ToolFailed {
            tool: tool.yt_dlp_path.clone(),
            message: last_error_line(&output.stderr),
        }
        .into());
    }

    Ok(watch_urls(&String::from_utf8_lossy(&output.stdout)))
}

fn watch_urls(ids: &str) -> Vec<String> {
    ids.lines()
        .map(str::trim)
        .filter(|id| !id.is_empty() && *id != "NA")
        .map(|id| format!("https://www.youtube.com/watch?v={}", id))
        .collect()
}
