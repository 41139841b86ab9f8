//! Exclusive volume group lock
//!
//! Structural operations on a volume group (attach, detach, commit) must not
//! race with each other. Holding a [`VgLockGuard`] is the token that proves
//! the caller owns the group for the duration of the operation; the cache
//! layer checks it against the group name before touching anything.
//!
//! Two layers of exclusion are provided: an in-process registry keyed by
//! group name, and an optional advisory `fs2` lock on `<dir>/<vg>.lock` so
//! separate processes sharing a metadata directory also serialize.

use cachevol_core::{Error, Result, LOCK_FILE_EXTENSION};
use fs2::FileExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

static HELD: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Proof that the caller holds the exclusive lock for one volume group
#[derive(Debug)]
pub struct VgLockGuard {
    vg: String,
    file: Option<LockFile>,
}

#[derive(Debug)]
struct LockFile {
    file: File,
    path: PathBuf,
}

/// Entry points for acquiring a [`VgLockGuard`]
pub struct VgLock;

impl VgLock {
    /// Lock a volume group within this process only
    pub fn acquire(vg: &str) -> Result<VgLockGuard> {
        register(vg)?;
        tracing::debug!(vg = %vg, "volume group locked");
        Ok(VgLockGuard {
            vg: vg.to_string(),
            file: None,
        })
    }

    /// Lock a volume group in this process and on disk under `dir`
    pub fn acquire_in(dir: &Path, vg: &str) -> Result<VgLockGuard> {
        register(vg)?;
        match lock_file(dir, vg) {
            Ok(file) => {
                tracing::debug!(vg = %vg, path = %file.path.display(), "volume group locked");
                Ok(VgLockGuard {
                    vg: vg.to_string(),
                    file: Some(file),
                })
            }
            Err(e) => {
                HELD.lock().remove(vg);
                Err(e)
            }
        }
    }
}

impl VgLockGuard {
    /// Name of the locked volume group
    pub fn vg_name(&self) -> &str {
        &self.vg
    }

    /// Fail unless this guard covers `vg`
    pub fn check(&self, vg: &str) -> Result<()> {
        if self.vg == vg {
            Ok(())
        } else {
            Err(Error::LockNotHeld { vg: vg.to_string() })
        }
    }
}

impl Drop for VgLockGuard {
    fn drop(&mut self) {
        if let Some(lock) = self.file.take() {
            // The file itself stays: unlinking it would let a process that
            // already opened it lock an orphaned inode
            let _ = fs2::FileExt::unlock(&lock.file);
        }
        HELD.lock().remove(&self.vg);
        tracing::debug!(vg = %self.vg, "volume group unlocked");
    }
}

fn register(vg: &str) -> Result<()> {
    let mut held = HELD.lock();
    if !held.insert(vg.to_string()) {
        return Err(Error::lock(vg, "already locked in this process"));
    }
    Ok(())
}

fn lock_file(dir: &Path, vg: &str) -> Result<LockFile> {
    fs::create_dir_all(dir).map_err(|e| Error::file_system(dir, "create lock directory", e))?;
    let path = dir.join(format!("{vg}.{LOCK_FILE_EXTENSION}"));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| Error::file_system(&path, "open lock file", e))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let pid = std::process::id();
            file.set_len(0)
                .and_then(|_| writeln!(file, "{pid}"))
                .and_then(|_| file.sync_all())
                .map_err(|e| Error::file_system(&path, "record lock owner", e))?;
            Ok(LockFile { file, path })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            // The kernel drops advisory locks of exited processes, so the
            // recorded pid is a live holder
            let owner = fs::read_to_string(&path)
                .ok()
                .and_then(|c| c.trim().parse::<u32>().ok());
            match owner {
                Some(pid) => Err(Error::lock(vg, format!("held by process {pid}"))),
                None => Err(Error::lock(vg, "held by another process")),
            }
        }
        Err(e) => Err(Error::file_system(&path, "lock", e)),
    }
}
