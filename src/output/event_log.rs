//! Persistent event log
//!
//! Appends `[YYYY-MM-DD HH:MM:SS] [LEVEL] message` lines to one file per
//! month (`price-sync-YYYY-MM.log`) and keeps the three most recent months.
//! Without detailed logging only errors and successes are written.

use crate::output::traits::OutputResult;
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "price-sync-";
const FILE_SUFFIX: &str = ".log";
const KEEP_FILES: usize = 3;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

impl EventLevel {
    /// Written even when detailed logging is off
    pub fn always_logged(&self) -> bool {
        matches!(self, Self::Error | Self::Success)
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        };
        write!(f, "{}", s)
    }
}

/// Monthly rotating log file
#[derive(Debug, Clone)]
pub struct EventLog {
    dir: PathBuf,
    detailed: bool,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>, detailed: bool) -> Self {
        Self {
            dir: dir.into(),
            detailed,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one event, rotating old files afterwards
    ///
    /// # Returns
    ///
    /// `Ok(false)` when the level was filtered out
    pub fn append_event(&self, level: EventLevel, message: &str) -> OutputResult<bool> {
        self.append_event_at(level, message, Utc::now())
    }

    pub fn append_event_at(
        &self,
        level: EventLevel,
        message: &str,
        now: DateTime<Utc>,
    ) -> OutputResult<bool> {
        if !self.detailed && !level.always_logged() {
            return Ok(false);
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(now);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(
            file,
            "[{}] [{}] {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        )?;

        self.rotate()?;
        Ok(true)
    }

    /// Log file for the month containing `now`
    pub fn file_for(&self, now: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, now.format("%Y-%m"), FILE_SUFFIX))
    }

    /// Existing log files, newest month first
    pub fn files(&self) -> OutputResult<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();

        // YYYY-MM names sort chronologically
        files.sort();
        files.reverse();
        Ok(files)
    }

    fn rotate(&self) -> OutputResult<()> {
        for old in self.files()?.into_iter().skip(KEEP_FILES) {
            fs::remove_file(&old)?;
        }
        Ok(())
    }
}
