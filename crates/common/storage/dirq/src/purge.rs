// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Garbage collection of the queue tree.
//!
//! One pass over the buckets:
//! 1. `rmdir` every bucket; an empty one disappears and needs no more work.
//! 2. In buckets that are not empty, delete `.tmp` files older than the temp
//!    lifetime and `.lck` files older than the lock lifetime (by mtime).
//!
//! Entries are never touched. A removed lock makes its entry claimable
//! again, so both lifetimes must stay well above the slowest produce or
//! consume, or purge will pull files out from under a live process.

use std::{
    fs, io,
    path::Path,
    time::{Duration, SystemTime},
};

use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    Result,
    error::{IoSnafu, is_not_empty, is_not_found},
    name::{self, FileKind},
    tree,
};

/// What one purge pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    /// Empty buckets removed.
    pub buckets_removed: usize,
    /// Stale temp files removed.
    pub temps_removed:   usize,
    /// Stale lock files removed.
    pub locks_removed:   usize,
}

impl PurgeReport {
    /// Total number of filesystem objects removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.buckets_removed + self.temps_removed + self.locks_removed
    }
}

pub(crate) fn purge(
    root: &Path,
    max_temp_life: Duration,
    max_lock_life: Duration,
) -> Result<PurgeReport> {
    let now = SystemTime::now();
    let mut report = PurgeReport::default();

    let buckets = tree::list_buckets(root).context(IoSnafu {
        action: "read queue root",
        path:   root,
    })?;

    for bucket in buckets {
        let dir = root.join(&bucket);
        match fs::remove_dir(&dir) {
            Ok(()) => {
                debug!(bucket = ?dir, "Removed empty bucket");
                report.buckets_removed += 1;
                continue;
            }
            Err(e) if is_not_empty(&e) => {}
            // Another purge got there first.
            Err(e) if is_not_found(&e) => continue,
            Err(e) => {
                return Err(e).context(IoSnafu {
                    action: "remove bucket",
                    path:   &dir,
                });
            }
        }

        purge_bucket(&dir, now, max_temp_life, max_lock_life, &mut report)?;
    }

    info!(
        path = ?root,
        buckets_removed = report.buckets_removed,
        temps_removed = report.temps_removed,
        locks_removed = report.locks_removed,
        "Purge complete"
    );
    Ok(report)
}

fn purge_bucket(
    dir: &Path,
    now: SystemTime,
    max_temp_life: Duration,
    max_lock_life: Duration,
    report: &mut PurgeReport,
) -> Result<()> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if is_not_found(&e) => return Ok(()),
        Err(e) => {
            return Err(e).context(IoSnafu {
                action: "read bucket",
                path:   dir,
            });
        }
    };

    for entry in read_dir {
        let entry = entry.context(IoSnafu {
            action: "read bucket",
            path:   dir,
        })?;
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        let (max_age, counter) = match name::classify(&file_name) {
            FileKind::Temp => (max_temp_life, &mut report.temps_removed),
            FileKind::Lock => (max_lock_life, &mut report.locks_removed),
            FileKind::Entry | FileKind::Foreign => continue,
        };

        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| {
            if m.is_file() {
                m.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(e) if is_not_found(&e) => continue,
            Err(e) => {
                return Err(e).context(IoSnafu {
                    action: "stat",
                    path:   &path,
                });
            }
        };

        // Clock skew between hosts can put mtimes in the future.
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match remove_stale(&path) {
            Ok(true) => {
                debug!(file = ?path, age = ?age, "Removed stale file");
                *counter += 1;
            }
            Ok(false) => {}
            Err(e) => {
                return Err(e).context(IoSnafu {
                    action: "remove stale file",
                    path:   &path,
                });
            }
        }
    }
    Ok(())
}

/// `Ok(false)` when somebody else removed the file first.
fn remove_stale(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use tempfile::TempDir;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn create_aged(path: &Path, age: Duration) {
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_purge_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let report = purge(temp_dir.path(), HOUR, HOUR).unwrap();
        assert_eq!(report, PurgeReport::default());
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_purge_removes_empty_buckets_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("12345678")).unwrap();
        fs::create_dir(root.join("12345abc")).unwrap();
        fs::create_dir(root.join("keep-me")).unwrap();
        File::create(root.join("12345678/1234567800000a")).unwrap();

        let report = purge(root, HOUR, HOUR).unwrap();

        assert_eq!(report.buckets_removed, 1);
        assert!(root.join("12345678").exists());
        assert!(!root.join("12345abc").exists());
        assert!(root.join("keep-me").exists());
    }

    #[test]
    fn test_purge_stale_files() {
        let temp_dir = TempDir::new().unwrap();
        let bucket = temp_dir.path().join("12345678");
        fs::create_dir(&bucket).unwrap();

        let old_temp = bucket.join("abcdef.tmp");
        let new_temp = bucket.join("fedcba.tmp");
        let old_lock = bucket.join("54321.lck");
        let new_lock = bucket.join("12345.lck");
        let entry = bucket.join("1234567800000a");
        let foreign = bucket.join("notes.txt");

        create_aged(&old_temp, 2 * HOUR);
        create_aged(&new_temp, Duration::ZERO);
        create_aged(&old_lock, 2 * HOUR);
        create_aged(&new_lock, Duration::from_secs(60));
        create_aged(&entry, 10 * HOUR);
        create_aged(&foreign, 10 * HOUR);

        let report = purge(temp_dir.path(), HOUR, HOUR).unwrap();

        assert_eq!(report.temps_removed, 1);
        assert_eq!(report.locks_removed, 1);
        assert_eq!(report.buckets_removed, 0);
        assert!(!old_temp.exists());
        assert!(!old_lock.exists());
        assert!(new_temp.exists());
        assert!(new_lock.exists());
        assert!(entry.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_purge_uses_separate_lifetimes() {
        let temp_dir = TempDir::new().unwrap();
        let bucket = temp_dir.path().join("12345678");
        fs::create_dir(&bucket).unwrap();

        let temp = bucket.join("1234567800000a.tmp");
        let lock = bucket.join("1234567800000b.lck");
        create_aged(&temp, Duration::from_secs(600));
        create_aged(&lock, Duration::from_secs(600));

        // Ten minute old files: past the temp lifetime, inside the lock one.
        let report = purge(temp_dir.path(), Duration::from_secs(300), HOUR).unwrap();

        assert_eq!(report.temps_removed, 1);
        assert_eq!(report.locks_removed, 0);
        assert!(!temp.exists());
        assert!(lock.exists());
    }

    #[test]
    fn test_purge_ignores_directories_with_stale_names() {
        let temp_dir = TempDir::new().unwrap();
        let bucket = temp_dir.path().join("12345678");
        fs::create_dir_all(bucket.join("odd.tmp")).unwrap();

        let report = purge(temp_dir.path(), Duration::ZERO, Duration::ZERO).unwrap();
        assert_eq!(report.total(), 0);
        assert!(bucket.join("odd.tmp").exists());
    }

    #[test]
    fn test_purge_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = purge(&temp_dir.path().join("gone"), HOUR, HOUR).unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));
    }
}
