use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("another run already holds the lock")]
    Contended,
}

/// Cross-process exclusive guard for one reconciliation run. Acquisition
/// never blocks: a contended lock is reported immediately so an overlapping
/// scheduled run can exit without side effects. The advisory lock is
/// released when the guard drops, on every exit path.
pub struct RunLock {
    _file: File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: file }),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(LockError::Contended)
            }
            Err(e) => Err(e.into()),
        }
    }
}
