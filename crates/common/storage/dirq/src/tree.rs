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

//! Walking the bucket/entry tree.
//!
//! Only directories directly under the root whose name is a bucket name are
//! descended, and only regular files whose name is an entry name are
//! reported. Buckets and entries come out in lexical order, which is roughly
//! creation order. A bucket's listing is read when the walk reaches it, so
//! entries published into later buckets during the walk may still show up.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    time::SystemTime,
    vec,
};

use snafu::ResultExt;

use crate::{
    Result,
    error::{IoSnafu, is_not_found},
    name,
};

/// A published entry seen during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryRef {
    pub bucket: String,
    pub name:   String,
    pub path:   PathBuf,
}

/// Sorted bucket names under `root`.
/// Set the mtime of `path` to now. Purge measures lock and temp lifetimes
/// from it.
pub(crate) fn touch(path: &Path) -> io::Result<()> {
    File::open(path)?.set_modified(SystemTime::now())
}

pub(crate) fn list_buckets(root: &Path) -> io::Result<Vec<String>> {
    list_names(root, |name, file_type| {
        file_type.is_dir() && name::is_bucket_name(name)
    })
}

/// Sorted entry names inside `bucket_dir`.
pub(crate) fn list_entries(bucket_dir: &Path) -> io::Result<Vec<String>> {
    list_names(bucket_dir, |name, file_type| {
        file_type.is_file() && name::is_entry_name(name)
    })
}

fn list_names<F>(dir: &Path, keep: F) -> io::Result<Vec<String>>
where
    F: Fn(&str, fs::FileType) -> bool,
{
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) if is_not_found(&e) => continue,
            Err(e) => return Err(e),
        };
        if keep(&name, file_type) {
            names.push(name);
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// Lazy, single-pass walk over every entry of the tree.
///
/// The walk is fused: after yielding an error it yields nothing more.
pub(crate) struct EntryWalker {
    root:    PathBuf,
    buckets: Option<vec::IntoIter<String>>,
    current: Option<(String, vec::IntoIter<String>)>,
    done:    bool,
}

impl EntryWalker {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root:    root.into(),
            buckets: None,
            current: None,
            done:    false,
        }
    }

    fn fail(&mut self, action: &'static str, path: &Path, err: io::Error) -> Result<EntryRef> {
        self.done = true;
        Err(err).context(IoSnafu { action, path })
    }
}

impl Iterator for EntryWalker {
    type Item = Result<EntryRef>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some((bucket, entries)) = self.current.as_mut() {
                if let Some(name) = entries.next() {
                    let path = self.root.join(bucket.as_str()).join(&name);
                    return Some(Ok(EntryRef {
                        bucket: bucket.clone(),
                        name,
                        path,
                    }));
                }
                self.current = None;
            }

            if self.buckets.is_none() {
                match list_buckets(&self.root) {
                    Ok(buckets) => self.buckets = Some(buckets.into_iter()),
                    Err(e) => {
                        let root = self.root.clone();
                        return Some(self.fail("read queue root", &root, e));
                    }
                }
            }

            let Some(bucket) = self.buckets.as_mut().and_then(Iterator::next) else {
                self.done = true;
                return None;
            };

            let dir = self.root.join(&bucket);
            match list_entries(&dir) {
                Ok(entries) => self.current = Some((bucket, entries.into_iter())),
                // Purged while we were walking.
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Some(self.fail("read bucket", &dir, e)),
            }
        }
    }
}
