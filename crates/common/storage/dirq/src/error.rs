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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Directory queue errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The queue root or one of the settings is unusable.
    #[snafu(display("Invalid queue configuration: {message}"))]
    InvalidConfig { message: String },

    /// A filesystem call failed.
    #[snafu(display("Failed to {action} {}: {source}", path.display()))]
    Io {
        action: &'static str,
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

impl Error {
    /// Kind of the underlying I/O failure, if this is an I/O error.
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            Self::InvalidConfig { .. } => None,
        }
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The target name is taken: a lost claim race or an entry name collision.
pub(crate) fn is_already_exists(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::AlreadyExists
}

/// The path vanished underneath us, usually removed by a concurrent process.
pub(crate) fn is_not_found(err: &io::Error) -> bool { err.kind() == io::ErrorKind::NotFound }

/// `rmdir` refused because the directory still has children.
///
/// POSIX allows both `ENOTEMPTY` and `EEXIST` here.
pub(crate) fn is_not_empty(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::DirectoryNotEmpty | io::ErrorKind::AlreadyExists
    )
}

#[cfg(test)]
mod tests {
    use snafu::ResultExt;

    use super::*;

    #[test]
    fn test_io_error_display_and_kind() {
        let err = Err::<(), _>(io::Error::from(io::ErrorKind::PermissionDenied))
            .context(IoSnafu {
                action: "create bucket",
                path:   "/queue/6789abcd",
            })
            .unwrap_err();

        assert_eq!(err.io_kind(), Some(io::ErrorKind::PermissionDenied));
        assert!(err.to_string().starts_with("Failed to create bucket /queue/6789abcd"));
    }

    #[test]
    fn test_invalid_config_has_no_io_kind() {
        let err = InvalidConfigSnafu {
            message: "umask out of range",
        }
        .build();
        assert_eq!(err.io_kind(), None);
        assert_eq!(
            err.to_string(),
            "Invalid queue configuration: umask out of range"
        );
    }

    #[test]
    fn test_expected_error_classification() {
        assert!(is_already_exists(&io::Error::from(
            io::ErrorKind::AlreadyExists
        )));
        assert!(is_not_found(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(is_not_empty(&io::Error::from(
            io::ErrorKind::DirectoryNotEmpty
        )));
        assert!(!is_not_empty(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
        // Classification goes by kind, never by message.
        assert!(!is_already_exists(&io::Error::other("File exists")));
    }
}
