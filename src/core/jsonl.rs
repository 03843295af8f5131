//! Locked access to append-only JSONL logs.
//!
//! Writers take an exclusive `flock` on the log for the whole
//! read-validate-append sequence, readers take a shared one, so several
//! processes can share a log.
//!
//! [`LogView`] folds a log into in-memory state and afterwards only reads
//! what was appended since, so lookups do not replay the whole history.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Handle to a log file held under a lock
pub struct LockedLog {
    file: File,
    path: PathBuf,
}

impl LockedLog {
    fn open(path: &Path, exclusive: bool) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open for a read-modify-append sequence
    pub fn exclusive(path: &Path) -> std::io::Result<Self> {
        Self::open(path, true)
    }

    /// Open for reading
    pub fn shared(path: &Path) -> std::io::Result<Self> {
        Self::open(path, false)
    }

    /// Current size of the log in bytes
    pub fn size(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Read the records that start at byte `offset`.
    ///
    /// Only newline-terminated lines count. Lines that fail to parse (e.g. a
    /// torn write from a crashed process, possibly cut inside a multi-byte
    /// character) are skipped with a warning. Returns the records and the
    /// offset just past the last complete line.
    pub fn read_from<T: DeserializeOwned>(
        &mut self,
        offset: u64,
    ) -> std::io::Result<(Vec<T>, u64)> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&self.file);
        let mut records = Vec::new();
        let mut consumed = offset;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 || line.last() != Some(&b'\n') {
                break;
            }
            let start = consumed;
            consumed += read as u64;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    offset = start,
                    error = %e,
                    "Skipping unreadable log line"
                ),
            }
        }

        Ok((records, consumed))
    }

    /// Whether the log is empty or its last byte is a newline
    fn ends_with_newline(&mut self) -> std::io::Result<bool> {
        if self.size()? == 0 {
            return Ok(true);
        }
        self.file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        self.file.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }

    /// Append one record as a single line.
    ///
    /// A torn tail left by an earlier crash is terminated first so the new
    /// record stays on its own line.
    pub fn append<T: Serialize>(&mut self, record: &T) -> std::io::Result<()> {
        let mut json = serde_json::to_string(record)?;
        json.push('\n');
        if !self.ends_with_newline()? {
            json.insert(0, '\n');
        }
        self.file.write_all(json.as_bytes())?;
        self.file.flush()
    }
}

impl Drop for LockedLog {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// State derived from a log, plus how far into the log it has read
#[derive(Debug, Default)]
pub struct LogView<S> {
    offset: u64,
    state: S,
}

impl<S: Default> LogView<S> {
    /// Lock a shared view. A view poisoned by a panic mid-refresh may be
    /// half-applied, so it is discarded and rebuilt from the start of the log.
    pub fn lock(shared: &Mutex<Self>) -> MutexGuard<'_, Self> {
        match shared.lock() {
            Ok(view) => view,
            Err(poisoned) => {
                let mut view = poisoned.into_inner();
                *view = Self::default();
                view
            }
        }
    }

    /// Fold in the records appended since the last refresh.
    ///
    /// Must be called with `log` locked. A log that shrank was replaced, so
    /// the view starts over.
    pub fn refresh<R, F>(&mut self, log: &mut LockedLog, mut apply: F) -> std::io::Result<&mut S>
    where
        R: DeserializeOwned,
        F: FnMut(&mut S, R),
    {
        if log.size()? < self.offset {
            *self = Self::default();
        }
        let (records, offset) = log.read_from::<R>(self.offset)?;
        for record in records {
            apply(&mut self.state, record);
        }
        self.offset = offset;
        Ok(&mut self.state)
    }
}
