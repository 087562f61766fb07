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

use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

/// Largest permission mask accepted; only the rwx bits are meaningful.
pub const MAX_UMASK: u32 = 0o777;

/// Settings of one queue handle.
///
/// Every field is passed in explicitly; nothing is read from the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, SmartDefault)]
pub struct QueueConfig {
    /// Root directory owning the whole tree.
    #[default(_code = "PathBuf::from(\"./dirq\")")]
    pub path:          PathBuf,
    /// Permission bits removed from every directory (0o777) and file
    /// (0o666) the queue creates.
    #[default = 0o022]
    pub umask:         u32,
    /// Width of the time window grouped into one bucket. Whole seconds.
    #[default(_code = "Duration::from_secs(1)")]
    pub granularity:   Duration,
    /// Age after which an orphaned `.tmp` file is purged.
    #[default(_code = "Duration::from_secs(300)")]
    pub max_temp_life: Duration,
    /// Age after which an orphaned `.lck` file is purged.
    #[default(_code = "Duration::from_secs(600)")]
    pub max_lock_life: Duration,
}

impl QueueConfig {
    /// Check that the settings describe a usable queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) when the
    /// root path is empty, the mask has bits outside `0o777`, or the
    /// granularity is not a positive whole number of seconds that fits a
    /// bucket name.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.path.as_os_str().is_empty(),
            InvalidConfigSnafu {
                message: "queue root path is empty",
            }
        );
        ensure!(
            self.umask <= MAX_UMASK,
            InvalidConfigSnafu {
                message: format!("umask {:#o} exceeds {MAX_UMASK:#o}", self.umask),
            }
        );
        ensure!(
            self.granularity.subsec_nanos() == 0
                && (1..=u64::from(u32::MAX)).contains(&self.granularity.as_secs()),
            InvalidConfigSnafu {
                message: format!(
                    "granularity must be a whole number of seconds between 1 and {}, got {:?}",
                    u32::MAX,
                    self.granularity
                ),
            }
        );
        Ok(())
    }

    /// Mode for directories created by the queue.
    pub(crate) const fn dir_mode(&self) -> u32 { 0o777 & !self.umask }

    /// Mode for payload files created by the queue.
    pub(crate) const fn file_mode(&self) -> u32 { 0o666 & !self.umask }

    pub(crate) const fn granularity_secs(&self) -> u64 { self.granularity.as_secs() }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.umask, 0o022);
        assert_eq!(config.granularity, Duration::from_secs(1));
        assert_eq!(config.max_temp_life, Duration::from_secs(300));
        assert_eq!(config.max_lock_life, Duration::from_secs(600));
    }

    #[test]
    fn test_modes_follow_umask() {
        let config = QueueConfig {
            umask: 0o027,
            ..Default::default()
        };
        assert_eq!(config.dir_mode(), 0o750);
        assert_eq!(config.file_mode(), 0o640);
    }

    #[test]
    fn test_empty_path_rejected() {
        let config = QueueConfig {
            path: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test_case(0o1000 ; "sticky bit")]
    #[test_case(0o7777 ; "all special bits")]
    fn test_umask_out_of_range_rejected(umask: u32) {
        let config = QueueConfig {
            umask,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test_case(Duration::ZERO ; "zero")]
    #[test_case(Duration::from_millis(1500) ; "fractional")]
    #[test_case(Duration::from_secs(u64::from(u32::MAX) + 1) ; "too wide")]
    fn test_bad_granularity_rejected(granularity: Duration) {
        let config = QueueConfig {
            granularity,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
