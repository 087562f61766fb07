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

use std::{path::PathBuf, time::Duration};

use crate::{Queue, QueueConfig, Result};

/// Fluent construction of a [`Queue`] with non-default settings.
pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    /// Start from the default settings for the queue rooted at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config: QueueConfig {
                path: path.into(),
                ..Default::default()
            },
        }
    }

    /// Permission bits removed from everything the queue creates.
    #[must_use]
    pub fn umask(mut self, umask: u32) -> Self {
        self.config.umask = umask;
        self
    }

    /// Time window covered by one bucket, in whole seconds.
    #[must_use]
    pub fn granularity(mut self, granularity: Duration) -> Self {
        self.config.granularity = granularity;
        self
    }

    /// Age after which [`Queue::purge`] deletes a `.tmp` file.
    #[must_use]
    pub fn max_temp_life(mut self, life: Duration) -> Self {
        self.config.max_temp_life = life;
        self
    }

    /// Age after which [`Queue::purge`] deletes a `.lck` file.
    #[must_use]
    pub fn max_lock_life(mut self, life: Duration) -> Self {
        self.config.max_lock_life = life;
        self
    }

    /// Validate the settings and open the queue.
    ///
    /// # Errors
    ///
    /// See [`Queue::new`].
    pub fn build(self) -> Result<Queue> { Queue::with_config(self.config) }
}
