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

//! Bucket and entry naming.
//!
//! ```text
//! <root>/<bucket>/<entry>        bucket: 8 hex digits, entry: 14 hex digits
//! <root>/<bucket>/<entry>.lck    claim marker (hardlink to the entry)
//! <root>/<bucket>/<name>.tmp     payload being written
//! ```
//!
//! Bucket names are the unix time rounded down to the granularity. Entry
//! names are seconds (8 digits), microseconds (5 digits) and one random
//! digit, so lexical order follows creation order within a bucket.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;

/// Length of a bucket directory name.
pub const BUCKET_NAME_LEN: usize = 8;

/// Length of an entry file name.
pub const ENTRY_NAME_LEN: usize = 14;

/// Suffix of payload files that are still being written.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Suffix of claim markers.
pub const LOCK_SUFFIX: &str = ".lck";

/// What a file found inside a bucket is, judged by its name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A published, consumable payload.
    Entry,
    /// A payload being written, or a leftover from a crashed producer.
    Temp,
    /// A claim marker held by a consumer.
    Lock,
    /// Anything else; neither consumed nor purged.
    Foreign,
}

/// Bucket name for `time` with windows of `granularity_secs` seconds.
///
/// `granularity_secs` must be at least one.
pub fn bucket_name(time: DateTime<Utc>, granularity_secs: u64) -> String {
    let secs = unix_secs(time);
    let window = secs - secs % granularity_secs.max(1);
    format!("{:08x}", window & 0xffff_ffff)
}

/// Entry name for `time` with a caller supplied random digit.
pub fn entry_name_with(time: DateTime<Utc>, random: u8) -> String {
    // Leap seconds push the sub-second part past one million.
    let micros = time.timestamp_subsec_micros().min(999_999);
    format!(
        "{:08x}{:05x}{:01x}",
        unix_secs(time) & 0xffff_ffff,
        micros,
        random & 0xf
    )
}

/// Fresh entry name for `time`.
pub fn entry_name(time: DateTime<Utc>) -> String {
    entry_name_with(time, rand::thread_rng().gen_range(0..16))
}

/// Fresh temp file name for `time`.
pub fn temp_name(time: DateTime<Utc>) -> String { format!("{}{TEMP_SUFFIX}", entry_name(time)) }

/// Path of the claim marker belonging to `entry`.
pub fn lock_path(entry: &Path) -> PathBuf {
    let mut lock = entry.as_os_str().to_owned();
    lock.push(LOCK_SUFFIX);
    PathBuf::from(lock)
}

/// Whether `name` is a bucket directory name.
pub fn is_bucket_name(name: &str) -> bool { is_lower_hex(name, BUCKET_NAME_LEN) }

/// Whether `name` is an entry file name.
pub fn is_entry_name(name: &str) -> bool { is_lower_hex(name, ENTRY_NAME_LEN) }

/// Classify a file name found inside a bucket.
pub fn classify(name: &str) -> FileKind {
    if is_entry_name(name) {
        FileKind::Entry
    } else if name.ends_with(TEMP_SUFFIX) {
        FileKind::Temp
    } else if name.ends_with(LOCK_SUFFIX) {
        FileKind::Lock
    } else {
        FileKind::Foreign
    }
}

/// Creation time encoded in an entry name, to microsecond precision.
pub fn entry_time(name: &str) -> Option<DateTime<Utc>> {
    if !is_entry_name(name) {
        return None;
    }
    let secs = i64::from_str_radix(&name[..8], 16).ok()?;
    let micros = u32::from_str_radix(&name[8..13], 16).ok()?;
    DateTime::from_timestamp(secs, micros.checked_mul(1_000)?)
}

fn is_lower_hex(name: &str, len: usize) -> bool {
    name.len() == len
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn unix_secs(time: DateTime<Utc>) -> u64 { u64::try_from(time.timestamp()).unwrap_or(0) }

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_bucket_name() {
        let time = Utc.with_ymd_and_hms(2026, 1, 14, 12, 0, 7).unwrap();
        // 1768392007 seconds
        assert_eq!(bucket_name(time, 1), "69678547");
        assert_eq!(bucket_name(time, 60), "69678540");
        assert!(is_bucket_name(&bucket_name(time, 1)));
    }

    #[test]
    fn test_bucket_name_orders_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 14, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        assert!(bucket_name(earlier, 1) < bucket_name(later, 1));
    }

    #[test]
    fn test_entry_name() {
        let time = Utc
            .with_ymd_and_hms(2026, 1, 14, 12, 0, 7)
            .unwrap()
            .checked_add_signed(chrono::Duration::microseconds(42))
            .unwrap();
        let name = entry_name_with(time, 0xb);
        assert_eq!(name, "696785470002ab");
        assert!(is_entry_name(&name));
        assert_eq!(entry_time(&name), Some(time));
    }

    #[test]
    fn test_random_entry_names_are_valid() {
        let time = Utc::now();
        for _ in 0..64 {
            let name = entry_name(time);
            assert_eq!(name.len(), ENTRY_NAME_LEN);
            assert_eq!(classify(&name), FileKind::Entry);
        }
        assert_eq!(classify(&temp_name(time)), FileKind::Temp);
    }

    #[test]
    fn test_lock_path() {
        let entry = Path::new("/queue/69678547/696785470002ab");
        assert_eq!(
            lock_path(entry),
            PathBuf::from("/queue/69678547/696785470002ab.lck")
        );
    }

    #[test_case("696785470002ab", FileKind::Entry ; "entry")]
    #[test_case("696785470002ab.tmp", FileKind::Temp ; "temp")]
    #[test_case("abcdef.tmp", FileKind::Temp ; "short temp")]
    #[test_case("696785470002ab.lck", FileKind::Lock ; "lock")]
    #[test_case("54321.lck", FileKind::Lock ; "short lock")]
    #[test_case("696785470002AB", FileKind::Foreign ; "uppercase")]
    #[test_case("696785470002a", FileKind::Foreign ; "too short")]
    #[test_case("README", FileKind::Foreign ; "foreign")]
    fn test_classify(name: &str, kind: FileKind) {
        assert_eq!(classify(name), kind);
    }

    #[test_case("12345678", true ; "valid")]
    #[test_case("12345abc", true ; "valid with letters")]
    #[test_case("1234567", false ; "too short")]
    #[test_case("1234567g", false ; "not hex")]
    #[test_case("ABCDEF12", false ; "uppercase")]
    fn test_is_bucket_name(name: &str, expected: bool) {
        assert_eq!(is_bucket_name(name), expected);
    }
}
