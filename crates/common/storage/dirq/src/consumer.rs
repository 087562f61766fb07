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

//! Claiming and reading entries.
//!
//! A consumer claims an entry by creating `<entry>.lck` as a hardlink to it.
//! Link creation fails for everybody but the first caller, so exactly one
//! consumer wins. The winner reads the payload, removes the entry and then
//! its lock. Losers skip the entry without reporting anything.
//!
//! [`Consume`] walks the tree once. It never waits for new entries; callers
//! that want continuous consumption poll by creating a new one.

use std::{fs, path::PathBuf};

use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    Message, Result,
    error::{IoSnafu, is_already_exists, is_not_found},
    name,
    tree::{self, EntryRef, EntryWalker},
};

/// Exclusive right to consume one entry, held through its lock file.
#[derive(Debug)]
pub(crate) struct Claim {
    entry: EntryRef,
    lock:  PathBuf,
}

impl Claim {
    /// Try to claim `entry`. `Ok(None)` means somebody else got it first.
    pub(crate) fn acquire(entry: EntryRef) -> Result<Option<Self>> {
        let lock = name::lock_path(&entry.path);
        match fs::hard_link(&entry.path, &lock) {
            Ok(()) => {
                // The link shares the entry's inode, so its mtime is the
                // publish time until restamped.
                if let Err(e) = tree::touch(&lock) {
                    if let Err(undo) = fs::remove_file(&lock) {
                        warn!(lock = ?lock, error = %undo, "Failed to release unstamped lock");
                    }
                    return Err(e).context(IoSnafu {
                        action: "stamp lock",
                        path:   &lock,
                    });
                }
                Ok(Some(Self { entry, lock }))
            }
            Err(e) if is_already_exists(&e) => {
                debug!(entry = ?entry.path, "Entry already claimed");
                Ok(None)
            }
            // Consumed and removed after we listed it.
            Err(e) if is_not_found(&e) => {
                debug!(entry = ?entry.path, "Entry vanished before claim");
                Ok(None)
            }
            Err(e) => Err(e).context(IoSnafu {
                action: "lock entry",
                path:   &entry.path,
            }),
        }
    }

    /// Read the payload, then remove the entry and the lock.
    ///
    /// On failure the lock may stay behind; purge releases it once it is
    /// older than the lock lifetime.
    pub(crate) fn take(self) -> Result<Message> {
        let payload = fs::read(&self.entry.path).context(IoSnafu {
            action: "read entry",
            path:   &self.entry.path,
        })?;
        fs::remove_file(&self.entry.path).context(IoSnafu {
            action: "remove entry",
            path:   &self.entry.path,
        })?;
        fs::remove_file(&self.lock).context(IoSnafu {
            action: "remove lock",
            path:   &self.lock,
        })?;

        debug!(entry = ?self.entry.path, len = payload.len(), "Consumed entry");
        Ok(Message {
            bucket:  self.entry.bucket,
            name:    self.entry.name,
            payload: Bytes::from(payload),
        })
    }
}

/// Finite, single-pass sequence of consumed messages.
///
/// Created by [`Queue::consume`](crate::Queue::consume). Every item is a
/// message this consumer claimed and removed, or the error that ended the
/// walk; nothing follows an error.
pub struct Consume {
    walker:   EntryWalker,
    finished: bool,
}

impl Consume {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            walker:   EntryWalker::new(root),
            finished: false,
        }
    }
}

impl Iterator for Consume {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        for entry in self.walker.by_ref() {
            let message = match entry.and_then(Claim::acquire) {
                Ok(Some(claim)) => claim.take(),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            if message.is_err() {
                self.finished = true;
            }
            return Some(message);
        }

        self.finished = true;
        None
    }
}

impl std::iter::FusedIterator for Consume {}

/// Whether the walk finds no entry at all. Claims nothing.
pub(crate) fn is_empty(root: impl Into<PathBuf>) -> Result<bool> {
    EntryWalker::new(root).next().transpose().map(|e| e.is_none())
}

/// Number of entries visible right now, claimed or not.
pub(crate) fn count(root: impl Into<PathBuf>) -> Result<usize> {
    EntryWalker::new(root).try_fold(0, |n, entry| entry.map(|_| n + 1))
}
