//! Advisory lock around the output file
//!
//! Multiple invocations may race on the same output path; a sibling
//! `.lock` file serialises them. The first attempt is non-blocking so the
//! caller can tell whether it had to wait. A waiter treats the output as
//! freshly written and previews instead of regenerating.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use crate::diag_must;

pub struct OutputLock {
    file: File,
    /// Whether the lock was contended and we blocked for it.
    pub waited: bool,
}

/// Acquire the exclusive lock at `path`, creating the file if needed.
pub fn wait_lock(path: &Path) -> io::Result<OutputLock> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let waited = match file.try_lock_exclusive() {
        Ok(()) => false,
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
            diag_must!("{}: waiting for lock", path.display());
            file.lock_exclusive()?;
            true
        }
        Err(err) => return Err(err),
    };

    Ok(OutputLock { file, waited })
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        // Keep the lock file around for the next run; only the lock is
        // released.
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
#[path = "test/lock.rs"]
mod tests;
