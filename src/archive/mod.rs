use anyhow::Context;
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::Result;

/// File name of the archive inside the output directory
pub const ARCHIVE_FILE_NAME: &str = ".archive.txt";

/// One completed item: `(extractor, id)`.
///
/// The extractor name is lowercased so `Youtube` (yt-dlp's extractor key) and `youtube`
/// (derived from a URL) compare equal. Ids are case-sensitive and kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveEntry {
    pub extractor: String,
    pub id: String,
}

impl ArchiveEntry {
    pub fn new(extractor: &str, id: &str) -> Self {
        Self {
            extractor: extractor.trim().to_lowercase(),
            id: id.trim().to_string(),
        }
    }

    /// Parse one `<extractor> <id>` archive line
    pub fn parse(line: &str) -> Option<Self> {
        let (extractor, id) = line.trim().split_once(char::is_whitespace)?;
        let id = id.trim();
        if extractor.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(extractor, id))
    }
}

impl fmt::Display for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.extractor, self.id)
    }
}

struct ArchiveState {
    entries: HashSet<ArchiveEntry>,
    file: Option<fs_err::File>,
}

/// Append-only record of finished downloads, shared by all workers of a batch.
///
/// The in-memory set and the log file only change together, under one lock.
pub struct Archive {
    path: PathBuf,
    state: Mutex<ArchiveState>,
}

impl Archive {
    /// Load the archive at `path`. A missing file means no history.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut entries = HashSet::new();

        if path.exists() {
            let content = fs_err::read_to_string(&path).context("Failed to read archive")?;
            for line in content.lines().filter(|line| !line.trim().is_empty()) {
                match ArchiveEntry::parse(line) {
                    Some(entry) => {
                        entries.insert(entry);
                    }
                    None => tracing::warn!("Ignoring malformed archive line: {:?}", line),
                }
            }
        }

        tracing::debug!("Loaded {} archive entries from {}", entries.len(), path.display());

        Ok(Self {
            path,
            state: Mutex::new(ArchiveState {
                entries,
                file: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, entry: &ArchiveEntry) -> bool {
        self.lock().entries.contains(entry)
    }

    /// Record a finished item. Returns `false` when it was already recorded.
    ///
    /// The membership check, the set insertion and the line append all happen under the
    /// same lock; if the append fails the insertion is rolled back.
    pub fn record(&self, entry: &ArchiveEntry) -> Result<bool> {
        let mut state = self.lock();
        if state.entries.contains(entry) {
            return Ok(false);
        }

        state.entries.insert(entry.clone());
        if let Err(err) = Self::append_line(&self.path, &mut state.file, entry) {
            state.entries.remove(entry);
            return Err(err);
        }

        Ok(true)
    }

    fn append_line(path: &Path, file: &mut Option<fs_err::File>, entry: &ArchiveEntry) -> Result<()> {
        if file.is_none() {
            let mut opened = fs_err::OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)
                .context("Failed to open archive for appending")?;
            // A run killed mid-append leaves a partial last line; terminate it first
            if !ends_with_newline(&mut opened)? {
                opened.write_all(b"\n").context("Failed to append to archive")?;
            }
            *file = Some(opened);
        }

        if let Some(file) = file.as_mut() {
            file.write_all(format!("{}\n", entry).as_bytes())
                .context("Failed to append to archive")?;
            file.flush()?;
        }

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ArchiveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// True for an empty file or one whose last byte is `\n`
fn ends_with_newline(file: &mut fs_err::File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
