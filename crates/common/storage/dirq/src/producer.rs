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

//! Two-phase publish.
//!
//! 1. Write the payload to `<bucket>/<name>.tmp` and `fsync` it.
//! 2. Hardlink the temp file to `<bucket>/<entry>`, then unlink the temp.
//!
//! The entry name only appears at step 2, once the payload is complete, so
//! consumers never see a partial entry. If the process dies between the two
//! steps the temp file stays behind for purge to collect.
//!
//! Names carry a random digit but two producers can still pick the same
//! name inside one microsecond; both the temp create and the publish link
//! fail with "already exists" in that case and are retried with a new name.

use std::{
    fs::{self, DirBuilder, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    QueueConfig, Result,
    error::{IoSnafu, is_already_exists},
    name, tree,
};

/// Attempts at finding an unused temp or entry name before giving up.
pub(crate) const MAX_NAME_ATTEMPTS: usize = 8;

/// Write `payload` into a new entry and return the entry path.
pub(crate) fn produce(config: &QueueConfig, payload: &[u8]) -> Result<PathBuf> {
    let now = Utc::now();
    let bucket_dir = ensure_bucket(config, now)?;
    let (temp, mut file) = create_temp(config, &bucket_dir, now)?;

    if let Err(e) = write_durably(&mut file, payload) {
        drop(file);
        discard_temp(&temp);
        return Err(e).context(IoSnafu {
            action: "write temp file",
            path:   &temp,
        });
    }
    drop(file);

    publish(&bucket_dir, &temp)
}

/// Move an existing file into the queue and publish it.
///
/// The file is renamed, so it must live on the queue's filesystem.
pub(crate) fn produce_path(config: &QueueConfig, source: &Path) -> Result<PathBuf> {
    let now = Utc::now();
    let bucket_dir = ensure_bucket(config, now)?;

    let mut attempt = 0;
    let temp = loop {
        attempt += 1;
        let temp = bucket_dir.join(name::temp_name(now));
        // Rename replaces silently, so skip names that are in use.
        if temp.symlink_metadata().is_err() {
            break temp;
        }
        if attempt >= MAX_NAME_ATTEMPTS {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists)).context(IoSnafu {
                action: "create temp file",
                path:   &temp,
            });
        }
    };

    fs::rename(source, &temp).context(IoSnafu {
        action: "move file into queue",
        path:   source,
    })?;
    // Rename keeps the source mtime; a stale one would let purge take it.
    if let Err(e) = tree::touch(&temp) {
        discard_temp(&temp);
        return Err(e).context(IoSnafu {
            action: "stamp temp file",
            path:   &temp,
        });
    }
    publish(&bucket_dir, &temp)
}

/// Create the bucket directory for `now` unless it already exists.
fn ensure_bucket(config: &QueueConfig, now: DateTime<Utc>) -> Result<PathBuf> {
    let dir = config
        .path
        .join(name::bucket_name(now, config.granularity_secs()));

    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(config.dir_mode());
    }

    match builder.create(&dir) {
        Ok(()) => {
            set_mode(&dir, config.dir_mode()).context(IoSnafu {
                action: "set bucket permissions",
                path:   &dir,
            })?;
            debug!(bucket = ?dir, "Created bucket");
        }
        Err(e) if is_already_exists(&e) => {}
        Err(e) => {
            return Err(e).context(IoSnafu {
                action: "create bucket",
                path:   &dir,
            });
        }
    }
    Ok(dir)
}

fn create_temp(
    config: &QueueConfig,
    bucket_dir: &Path,
    now: DateTime<Utc>,
) -> Result<(PathBuf, File)> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(config.file_mode());
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let temp = bucket_dir.join(name::temp_name(now));
        match options.open(&temp) {
            Ok(file) => {
                set_file_mode(&file, config.file_mode()).context(IoSnafu {
                    action: "set temp file permissions",
                    path:   &temp,
                })?;
                return Ok((temp, file));
            }
            Err(e) if is_already_exists(&e) && attempt < MAX_NAME_ATTEMPTS => {
                debug!(temp = ?temp, attempt, "Temp name in use, picking another");
            }
            Err(e) => {
                return Err(e).context(IoSnafu {
                    action: "create temp file",
                    path:   &temp,
                });
            }
        }
    }
}

fn write_durably(file: &mut File, payload: &[u8]) -> io::Result<()> {
    file.write_all(payload)?;
    file.sync_all()
}

/// Link `temp` to a fresh entry name; the entry is visible once this returns.
fn publish(bucket_dir: &Path, temp: &Path) -> Result<PathBuf> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let entry = bucket_dir.join(name::entry_name(Utc::now()));
        match fs::hard_link(temp, &entry) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(temp) {
                    // The entry is already valid; purge collects the leftover.
                    warn!(temp = ?temp, error = %e, "Failed to remove temp file after publish");
                }
                debug!(entry = ?entry, "Published entry");
                return Ok(entry);
            }
            Err(e) if is_already_exists(&e) && attempt < MAX_NAME_ATTEMPTS => {
                debug!(entry = ?entry, attempt, "Entry name in use, picking another");
            }
            Err(e) => {
                discard_temp(temp);
                return Err(e).context(IoSnafu {
                    action: "publish entry",
                    path:   &entry,
                });
            }
        }
    }
}

fn discard_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp) {
        warn!(temp = ?temp, error = %e, "Failed to remove unpublished temp file");
    }
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> { Ok(()) }

#[cfg(unix)]
fn set_file_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_file_mode(_file: &File, _mode: u32) -> io::Result<()> { Ok(()) }

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn config_for(dir: &TempDir) -> QueueConfig {
        QueueConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn bucket_files(bucket_dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(bucket_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_produce_leaves_only_the_entry() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let entry = produce(&config, b"payload").unwrap();
        let bucket_dir = entry.parent().unwrap();

        assert!(name::is_bucket_name(
            bucket_dir.file_name().unwrap().to_str().unwrap()
        ));
        assert_eq!(
            bucket_files(bucket_dir),
            vec![entry.file_name().unwrap().to_str().unwrap().to_string()]
        );
        assert_eq!(fs::read(&entry).unwrap(), b"payload");
    }

    #[cfg(unix)]
    #[test]
    fn test_produce_applies_umask() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let config = QueueConfig {
            umask: 0o077,
            ..config_for(&temp_dir)
        };

        let entry = produce(&config, b"secret").unwrap();
        let file_mode = fs::metadata(&entry).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(entry.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;

        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn test_produce_into_existing_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let config = QueueConfig {
            granularity: std::time::Duration::from_secs(3600),
            ..config_for(&temp_dir)
        };

        for i in 0..10 {
            produce(&config, format!("msg-{i}").as_bytes()).unwrap();
        }

        let buckets = tree::list_buckets(temp_dir.path()).unwrap();
        assert!(buckets.len() <= 2);
        let total: usize = buckets
            .iter()
            .map(|b| tree::list_entries(&temp_dir.path().join(b)).unwrap().len())
            .sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_produce_path_moves_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let source = temp_dir.path().join("incoming.dat");
        fs::write(&source, b"from disk").unwrap();

        let entry = produce_path(&config, &source).unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&entry).unwrap(), b"from disk");
        assert_eq!(bucket_files(entry.parent().unwrap()).len(), 1);
    }

    #[test]
    fn test_produce_path_refreshes_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let source = temp_dir.path().join("old.dat");
        fs::write(&source, b"written long ago").unwrap();
        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(7200))
            .unwrap();

        let entry = produce_path(&config, &source).unwrap();

        let age = fs::metadata(&entry)
            .unwrap()
            .modified()
            .unwrap()
            .elapsed()
            .unwrap_or_default();
        assert!(age < std::time::Duration::from_secs(60));
    }

    #[test]
    fn test_produce_path_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let err = produce_path(&config, &temp_dir.path().join("nope")).unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));
    }

    #[test]
    fn test_produce_into_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = QueueConfig {
            path: temp_dir.path().join("gone"),
            ..Default::default()
        };

        let err = produce(&config, b"x").unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));
    }
}
