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

//! Layered CLI settings: built-in defaults, then an optional config file,
//! then `DIRQ__SECTION__KEY` environment variables. Command-line flags are
//! applied on top by the caller.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::ConfigError;
use dirq::QueueConfig;
use dirq_common_telemetry::logging::LoggingOptions;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{Whatever, whatever};

const ENV_PREFIX: &str = "DIRQ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Settings {
    pub queue:   QueueSettings,
    #[default(_code = "quiet_logging()")]
    pub logging: LoggingOptions,
}

/// Queue section; lifetimes are in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueSettings {
    pub root:               Option<PathBuf>,
    #[default = 0o022]
    pub umask:              u32,
    #[default = 1]
    pub granularity_secs:   u64,
    #[default = 300]
    pub max_temp_life_secs: u64,
    #[default = 600]
    pub max_lock_life_secs: u64,
}

// Queue construction logs at info; keep one-shot commands quiet unless asked.
fn quiet_logging() -> LoggingOptions {
    LoggingOptions {
        level: Some("warn".to_string()),
        ..Default::default()
    }
}

impl Settings {
    /// Load settings, merging `path` when given. A missing `path` is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl QueueSettings {
    pub fn to_config(&self) -> Result<QueueConfig, Whatever> {
        let Some(path) = self.root.clone() else {
            whatever!("no queue root configured, pass --root or set queue.root")
        };
        Ok(QueueConfig {
            path,
            umask: self.umask,
            granularity: Duration::from_secs(self.granularity_secs),
            max_temp_life: Duration::from_secs(self.max_temp_life_secs),
            max_lock_life: Duration::from_secs(self.max_lock_life_secs),
        })
    }
}
