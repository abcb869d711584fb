//! Persistent session ledgers.
//!
//! A session's staging ledger lives at `<state_dir>/staging/<session>.json`.
//! Readers and writers serialize on `<session>.json.lock` (fs2/flock), and
//! saves go through a temp file + rename so a crash never leaves a torn ledger.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::staging::StagingLedger;

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Session used when none is given
pub const DEFAULT_SESSION: &str = "default";

const LOCK_RETRY_INTERVAL_MS: u64 = 50;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // Windows reports sharing/lock violations as raw OS errors.
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// A file lock guard that releases the lock when dropped
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock, waiting up to `timeout_ms`.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock { file });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Try to acquire the lock without waiting.
    ///
    /// Returns `Ok(None)` if another holder has it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(FileLock { file })),
            Err(e) if is_lock_contended(&e) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Write `data` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        std::process::id()
    ));

    let mut temp_file = File::create(&temp_path)?;
    temp_file.write_all(data)?;
    temp_file.sync_all()?;
    drop(temp_file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Location of one session's ledger on disk.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    session: String,
    path: PathBuf,
    lock_path: PathBuf,
}

impl LedgerFile {
    /// Ledger file for `session` under `state_dir`.
    pub fn new(state_dir: &Path, session: &str) -> Result<Self> {
        validate_session(session)?;
        let dir = state_dir.join("staging");
        Ok(Self {
            session: session.to_string(),
            path: dir.join(format!("{session}.json")),
            lock_path: dir.join(format!("{session}.json.lock")),
        })
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the ledger under the lock; a missing file is an empty ledger.
    pub fn load(&self) -> Result<StagingLedger> {
        let _lock = FileLock::acquire(&self.lock_path, DEFAULT_LOCK_TIMEOUT_MS)?;
        self.read_unlocked()
    }

    /// Lock the ledger for a read-modify-write cycle.
    ///
    /// The lock is held until the returned guard is dropped; call
    /// [`LockedLedger::save`] to persist changes.
    pub fn lock(&self) -> Result<LockedLedger> {
        let lock = FileLock::acquire(&self.lock_path, DEFAULT_LOCK_TIMEOUT_MS)?;
        let ledger = self.read_unlocked()?;
        Ok(LockedLedger {
            file: self.clone(),
            ledger,
            _lock: lock,
        })
    }

    fn read_unlocked(&self) -> Result<StagingLedger> {
        match fs::read(&self.path) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StagingLedger::new()),
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn write_unlocked(&self, ledger: &StagingLedger) -> Result<()> {
        if ledger.is_empty() {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(Error::Io(err)),
            }
            debug!(session = %self.session, "staging ledger cleared");
            return Ok(());
        }
        let data = serde_json::to_vec_pretty(ledger)?;
        write_atomic(&self.path, &data)?;
        debug!(session = %self.session, staged = ledger.len(), "staging ledger saved");
        Ok(())
    }
}

/// A ledger loaded under its file lock.
pub struct LockedLedger {
    file: LedgerFile,
    ledger: StagingLedger,
    _lock: FileLock,
}

impl LockedLedger {
    pub fn ledger(&self) -> &StagingLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut StagingLedger {
        &mut self.ledger
    }

    /// Persist the current ledger; the lock stays held.
    pub fn save(&self) -> Result<()> {
        self.file.write_unlocked(&self.ledger)
    }
}

fn validate_session(session: &str) -> Result<()> {
    let valid = !session.is_empty()
        && !session.starts_with('.')
        && session
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid session name '{session}': use letters, digits, '-', '_' or '.'"
        )))
    }
}
