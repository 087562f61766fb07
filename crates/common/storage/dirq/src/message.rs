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

//! Messages handed to consumers.
//!
//! Entries carry no envelope on disk: the file content is the payload, byte
//! for byte. The bucket and entry names are kept alongside so a consumer can
//! tell where (and roughly when) a payload was produced.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::name;

/// A payload claimed and removed from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Bucket directory the entry lived in.
    pub bucket:  String,
    /// Entry file name.
    pub name:    String,
    /// Raw file content.
    pub payload: Bytes,
}

impl Message {
    /// Time the entry was published, decoded from its name.
    #[must_use]
    pub fn produced_at(&self) -> Option<DateTime<Utc>> { name::entry_time(&self.name) }

    /// Consume the message, keeping only the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}
