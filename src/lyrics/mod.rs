//! Caption track to LRC conversion
//!
//! Both WebVTT and SRT tracks are accepted. Every cue becomes one `[mm:ss.cc]text` line;
//! markup is stripped and consecutive cues with the same text are collapsed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static TIMING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\S+)\s+-->\s+(\S+)").expect("valid timing regex")
});

static TIMECODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+):)?(\d{1,2}):(\d{2})[.,](\d{1,3})$").expect("valid timecode regex")
});

static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid markup regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// A single timed lyric line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    /// Start offset in milliseconds
    pub start_ms: u64,

    pub text: String,
}

impl LyricLine {
    /// `[mm:ss.cc]` with hours folded into minutes and centiseconds truncated
    pub fn timestamp(&self) -> String {
        let total_seconds = self.start_ms / 1000;
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        let centis = (self.start_ms % 1000) / 10;
        format!("[{:02}:{:02}.{:02}]", minutes, seconds, centis)
    }
}

/// Ordered timed lyrics ready to embed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricsDocument {
    pub lines: Vec<LyricLine>,
}

impl LyricsDocument {
    /// Convert raw caption text. Never fails: unusable cues are dropped.
    pub fn from_captions(raw: &str) -> Self {
        let normalized = raw.trim_start_matches('\u{feff}').replace("\r\n", "\n").replace('\r', "\n");
        let body = strip_header(&normalized);

        let mut lines: Vec<LyricLine> = Vec::new();
        for (start, text) in extract_cues(body) {
            let Some(start_ms) = parse_timecode(start) else {
                tracing::debug!("Dropping cue with malformed timecode {:?}", start);
                continue;
            };

            let text = clean_text(&text);
            if text.is_empty() {
                continue;
            }
            if lines.last().is_some_and(|prev| prev.text == text) {
                continue;
            }

            lines.push(LyricLine { start_ms, text });
        }

        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

impl fmt::Display for LyricsDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}{}", line.timestamp(), line.text)?;
        }
        Ok(())
    }
}

/// Parse `H:MM:SS.mmm`, `HH:MM:SS,mmm` or `MM:SS.mmm` into milliseconds
pub fn parse_timecode(timecode: &str) -> Option<u64> {
    let caps = TIMECODE.captures(timecode.trim())?;

    let hours: u64 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    if minutes > 59 || seconds > 59 {
        return None;
    }

    // "5" and "50" are fractions too: pad to milliseconds.
    let fraction = &caps[4];
    let millis: u64 = format!("{:0<3}", fraction).parse().ok()?;

    hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(1000)?
        .checked_add(millis)
}

/// Drop a WEBVTT preamble (everything before the first blank line)
fn strip_header(text: &str) -> &str {
    let trimmed = text.trim_start();
    if !trimmed.starts_with("WEBVTT") {
        return trimmed;
    }
    match trimmed.find("\n\n") {
        Some(pos) => &trimmed[pos + 2..],
        None => "",
    }
}

fn is_sequence_label(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

/// Pair every timing line's start timecode with the text lines under it
fn extract_cues(body: &str) -> Vec<(&str, String)> {
    let lines: Vec<&str> = body.lines().collect();
    let mut cues = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = TIMING_LINE.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let start = caps.get(1).map_or("", |m| m.as_str());
        i += 1;

        let mut text_lines = Vec::new();
        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() || TIMING_LINE.is_match(line) {
                break;
            }
            // The next cue's number when the blank separator is missing.
            if is_sequence_label(line) && lines.get(i + 1).is_some_and(|next| TIMING_LINE.is_match(next)) {
                break;
            }
            text_lines.push(line);
            i += 1;
        }

        cues.push((start, text_lines.join("\n")));
    }

    cues
}

fn clean_text(block: &str) -> String {
    let without_markup = MARKUP.replace_all(block, "");
    let mut lines: Vec<&str> = without_markup.lines().collect();
    if lines.len() > 1 && is_sequence_label(lines[0]) {
        lines.remove(0);
    }

    let joined = lines.join(" ");
    let decoded = joined
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}
