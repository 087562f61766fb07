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

//! Broker-less persistent queue on a shared directory tree.
//!
//! Producers and consumers are independent processes that coordinate only
//! through filesystem atomicity: payloads are published with a hardlink
//! from a fully written temp file, and consumers claim entries by creating a
//! hardlinked `.lck` marker that only one of them can win. See [`Queue`].

pub mod builder;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod name;
mod producer;
pub mod purge;
pub mod queue;
mod tree;

pub use builder::QueueBuilder;
pub use config::QueueConfig;
pub use consumer::Consume;
pub use error::{Error, Result};
pub use message::Message;
pub use purge::PurgeReport;
pub use queue::Queue;
