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

//! Queue handle.
//!
//! A [`Queue`] is nothing but a root path and a few settings. It holds no
//! open files, threads or locks, so any number of handles in any number of
//! processes can work on the same tree at once.
//!
//! ## Usage
//!
//! ```no_run
//! use dirq::QueueBuilder;
//!
//! # fn main() -> dirq::Result<()> {
//! let queue = QueueBuilder::new("/var/spool/dirq").build()?;
//!
//! queue.produce(b"hello")?;
//!
//! for message in queue.consume() {
//!     println!("{:?}", message?.payload);
//! }
//!
//! queue.purge()?;
//! queue.close();
//! # Ok(())
//! # }
//! ```

use std::{
    fs::{self, DirBuilder},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use snafu::{ResultExt, ensure};
use tracing::{debug, info};

use crate::{
    Message, QueueConfig, Result,
    consumer::{self, Consume},
    error::{InvalidConfigSnafu, IoSnafu},
    producer,
    purge::{self, PurgeReport},
};

/// Handle on a directory queue.
///
/// Cheap to clone; clones share the configuration.
#[derive(Debug, Clone)]
pub struct Queue {
    config: Arc<QueueConfig>,
}

impl Queue {
    /// Open the queue at `path`, creating the root if needed.
    ///
    /// `umask` is removed from the permissions of everything the queue
    /// creates. All other settings take their defaults; use
    /// [`QueueBuilder`](crate::QueueBuilder) to change them.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, the root cannot be
    /// created, or the root exists but is not a directory.
    pub fn new(path: impl Into<PathBuf>, umask: u32) -> Result<Self> {
        Self::with_config(QueueConfig {
            path: path.into(),
            umask,
            ..Default::default()
        })
    }

    /// Open a queue from a complete configuration.
    ///
    /// # Errors
    ///
    /// See [`Queue::new`].
    pub fn with_config(config: QueueConfig) -> Result<Self> {
        config.validate()?;

        let created = fs::symlink_metadata(&config.path).is_err();
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(config.dir_mode());
        }
        builder.create(&config.path).context(IoSnafu {
            action: "create queue root",
            path:   &config.path,
        })?;
        if created {
            producer::set_mode(&config.path, config.dir_mode()).context(IoSnafu {
                action: "set queue root permissions",
                path:   &config.path,
            })?;
        }

        let metadata = fs::metadata(&config.path).context(IoSnafu {
            action: "stat queue root",
            path:   &config.path,
        })?;
        ensure!(
            metadata.is_dir(),
            InvalidConfigSnafu {
                message: format!("{} is not a directory", config.path.display()),
            }
        );

        info!(
            path = ?config.path,
            umask = %format!("{:#o}", config.umask),
            granularity = ?config.granularity,
            "Queue opened"
        );

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Publish `payload` as a new entry and return the entry's path.
    ///
    /// Either the whole payload becomes visible or nothing does.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket, the temp file or the entry link cannot
    /// be created, or the payload cannot be written.
    pub fn produce(&self, payload: impl AsRef<[u8]>) -> Result<PathBuf> {
        producer::produce(&self.config, payload.as_ref())
    }

    /// Publish the file at `path` by moving it into the queue.
    ///
    /// The file must be on the same filesystem as the queue root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be moved into a bucket or linked
    /// to an entry name.
    pub fn produce_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        producer::produce_path(&self.config, path.as_ref())
    }

    /// Walk the queue once, claiming and removing every entry on the way.
    ///
    /// The returned iterator is lazy: each `next` claims at most one entry.
    /// It ends when the walk is complete and does not wait for new entries.
    #[must_use]
    pub fn consume(&self) -> Consume { Consume::new(self.config.path.clone()) }

    /// Claim, read and remove a single entry.
    ///
    /// Returns `Ok(None)` if nothing could be claimed.
    ///
    /// # Errors
    ///
    /// Returns an error if walking the tree or reading the claimed entry
    /// fails.
    pub fn consume_one(&self) -> Result<Option<Message>> { self.consume().next().transpose() }

    /// Whether the queue holds no entry. Claims nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn is_empty(&self) -> Result<bool> { consumer::is_empty(self.config.path.clone()) }

    /// Number of entries currently in the queue, including claimed ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn count(&self) -> Result<usize> { consumer::count(self.config.path.clone()) }

    /// Purge with the configured temp and lock lifetimes.
    ///
    /// # Errors
    ///
    /// See [`Queue::purge_with`].
    pub fn purge(&self) -> Result<PurgeReport> {
        self.purge_with(self.config.max_temp_life, self.config.max_lock_life)
    }

    /// Remove empty buckets, plus temp and lock files older than the given
    /// lifetimes.
    ///
    /// # Errors
    ///
    /// Returns an error on the first filesystem failure other than a bucket
    /// being non-empty or a file already being gone.
    pub fn purge_with(
        &self,
        max_temp_life: Duration,
        max_lock_life: Duration,
    ) -> Result<PurgeReport> {
        purge::purge(&self.config.path, max_temp_life, max_lock_life)
    }

    /// Queue root.
    #[must_use]
    pub fn path(&self) -> &Path { &self.config.path }

    /// Queue configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig { &self.config }

    /// Release the handle. A queue holds no resources, so this only drops it.
    pub fn close(self) {
        debug!(path = ?self.config.path, "Queue closed");
    }
}
