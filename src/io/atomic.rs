//! Atomic file replacement through a sibling temporary file and `rename`.
//!
//! [`StagedFile`] separates writing from committing so that two files (the
//! instrumented output and its CID) can be prepared before either becomes
//! visible. An uncommitted stage removes its temporary file when dropped.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 10;

/// Unique sibling path `<name>.tmp.<pid>.<nanos>.<counter>`.
pub fn temp_path_for(target: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");

    target.with_file_name(format!(
        "{name}.tmp.{}.{timestamp}.{counter}",
        std::process::id()
    ))
}

/// Run `operation` up to three times with exponential backoff.
///
/// `NotFound` is returned immediately since retrying cannot fix it.
pub fn retry_with_backoff<T, F>(mut operation: F, operation_name: &str) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == ErrorKind::NotFound || attempt >= MAX_ATTEMPTS => return Err(e),
            Err(e) => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt - 1));
                tracing::debug!(
                    "{operation_name} failed (attempt {attempt}/{MAX_ATTEMPTS}): {e}; retrying in {delay:?}"
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Create the parent directory of `path`, tolerating concurrent creation.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => retry_with_backoff(
            || match fs::create_dir_all(parent) {
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
                other => other,
            },
            "create directory",
        ),
        _ => Ok(()),
    }
}

/// Data written next to its target, not yet renamed into place.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn stage(target: &Path, data: &[u8]) -> io::Result<Self> {
        ensure_parent_dir(target)?;
        let temp = temp_path_for(target);
        let staged = Self {
            temp,
            target: target.to_path_buf(),
            committed: false,
        };
        retry_with_backoff(|| fs::write(&staged.temp, data), "write temporary file")?;
        Ok(staged)
    }

    /// Rename the temporary file over the target.
    pub fn commit(mut self) -> io::Result<PathBuf> {
        retry_with_backoff(|| fs::rename(&self.temp, &self.target), "atomic rename")?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Replace `target` with `data` atomically.
pub fn write_atomically(target: &Path, data: &[u8]) -> io::Result<()> {
    StagedFile::stage(target, data)?.commit().map(|_| ())
}

/// Remove `path`, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
