//! Retention policy evaluation.
//!
//! Pure selection logic: given a listing of archive files and the configured
//! limits, decide which files must go. The three rules are independent; each
//! enabled rule is applied against the live on-disk set by the store, age
//! first, then size, then count, with the set re-listed between rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 1 MB = 1,048,576 bytes (binary megabytes).
pub const BYTES_PER_MB: u64 = 1_048_576;

/// The three retention thresholds. `None` disables a rule; a disabled rule
/// never causes deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionLimits {
    /// Archives strictly older than this many whole days are deleted
    pub max_age_days: Option<i64>,

    /// Aggregate size cap for one unit's archive directory, in megabytes
    pub max_total_size_mb: Option<u64>,

    /// Maximum number of archives kept per unit
    pub max_count: Option<usize>,
}

impl RetentionLimits {
    pub fn is_disabled(&self) -> bool {
        self.max_age_days.is_none() && self.max_total_size_mb.is_none() && self.max_count.is_none()
    }
}

/// One archive file as seen in a directory listing. Creation time is derived
/// from the file modification time; there is no separate metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Archives whose age in whole days (floor) exceeds `max_age_days`.
/// All qualifying archives are selected; order is unspecified.
pub fn select_expired(
    archives: &[ArchiveInfo],
    max_age_days: i64,
    now: DateTime<Utc>,
) -> Vec<PathBuf> {
    archives
        .iter()
        .filter(|a| now.signed_duration_since(a.modified).num_days() > max_age_days)
        .map(|a| a.path.clone())
        .collect()
}

/// Greedy oldest-first eviction until the aggregate size fits under the cap.
///
/// The loop re-evaluates the total after each hypothetical removal and is
/// bounded by the live file count, so it terminates even if the directory is
/// tampered with between listing and deletion. An empty set selects nothing.
pub fn select_over_size(archives: &[ArchiveInfo], max_total_size_mb: u64) -> Vec<PathBuf> {
    let limit = max_total_size_mb.saturating_mul(BYTES_PER_MB);
    let live = sorted_oldest_first(archives);

    let mut total: u64 = live.iter().map(|a| a.size).sum();
    let mut evict = Vec::new();
    let mut idx = 0;

    while total > limit && idx < live.len() {
        total -= live[idx].size;
        evict.push(live[idx].path.clone());
        idx += 1;
    }

    evict
}

/// Oldest-first eviction until no more than `max_count` archives remain.
pub fn select_over_count(archives: &[ArchiveInfo], max_count: usize) -> Vec<PathBuf> {
    if archives.len() <= max_count {
        return Vec::new();
    }

    let live = sorted_oldest_first(archives);
    let excess = live.len() - max_count;
    live.iter().take(excess).map(|a| a.path.clone()).collect()
}

/// Oldest by modification time, ties broken by lexical path order.
fn sorted_oldest_first(archives: &[ArchiveInfo]) -> Vec<&ArchiveInfo> {
    let mut live: Vec<&ArchiveInfo> = archives.iter().collect();
    live.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap()
    }

    fn info(name: &str, size: u64, age_days: i64) -> ArchiveInfo {
        ArchiveInfo {
            path: PathBuf::from(name),
            size,
            modified: now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_age_rule_deletes_only_older_than_limit() {
        let archives = vec![
            info("a.tar.zst", 10, 1),
            info("b.tar.zst", 10, 10),
            info("c.tar.zst", 10, 40),
        ];

        let evicted = select_expired(&archives, 30, now());
        assert_eq!(evicted, vec![PathBuf::from("c.tar.zst")]);
    }

    #[test]
    fn test_age_rule_is_exclusive_at_boundary() {
        // Exactly at the limit is kept; strictly older goes
        let archives = vec![info("at.tar.zst", 1, 30), info("over.tar.zst", 1, 31)];
        let evicted = select_expired(&archives, 30, now());
        assert_eq!(evicted, vec![PathBuf::from("over.tar.zst")]);
    }

    #[test]
    fn test_age_rule_idempotent() {
        let archives = vec![info("a.tar.zst", 10, 40), info("b.tar.zst", 10, 5)];
        let first = select_expired(&archives, 30, now());
        assert_eq!(first.len(), 1);

        let remaining: Vec<ArchiveInfo> = archives
            .into_iter()
            .filter(|a| !first.contains(&a.path))
            .collect();
        assert!(select_expired(&remaining, 30, now()).is_empty());
    }

    #[test]
    fn test_size_rule_evicts_oldest_until_under_cap() {
        // 5 archives of 100 MB each, cap 250 MB: the 3 oldest go
        let archives: Vec<ArchiveInfo> = (0..5i64)
            .map(|i| info(&format!("{i}.tar.zst"), 100 * BYTES_PER_MB, 5 - i))
            .collect();

        let evicted = select_over_size(&archives, 250);
        assert_eq!(
            evicted,
            vec![
                PathBuf::from("0.tar.zst"),
                PathBuf::from("1.tar.zst"),
                PathBuf::from("2.tar.zst"),
            ]
        );
    }

    #[test]
    fn test_size_rule_empties_set_if_everything_is_too_big() {
        let archives = vec![info("a.tar.zst", 10 * BYTES_PER_MB, 1)];
        let evicted = select_over_size(&archives, 5);
        assert_eq!(evicted.len(), 1);
    }

    #[test]
    fn test_size_rule_under_cap_is_noop() {
        let archives = vec![info("a.tar.zst", BYTES_PER_MB, 1)];
        assert!(select_over_size(&archives, 5).is_empty());
    }

    #[test]
    fn test_count_rule_keeps_newest() {
        // 10 archives, cap 3: the 7 oldest go
        let archives: Vec<ArchiveInfo> = (0..10i64)
            .map(|i| info(&format!("{i:02}.tar.zst"), 1, 10 - i))
            .collect();

        let evicted = select_over_count(&archives, 3);
        assert_eq!(evicted.len(), 7);
        assert!(!evicted.contains(&PathBuf::from("07.tar.zst")));
        assert!(!evicted.contains(&PathBuf::from("08.tar.zst")));
        assert!(!evicted.contains(&PathBuf::from("09.tar.zst")));
    }

    #[test]
    fn test_ties_broken_by_lexical_path_order() {
        let archives = vec![
            info("b.tar.zst", 1, 3),
            info("a.tar.zst", 1, 3),
            info("c.tar.zst", 1, 1),
        ];

        let evicted = select_over_count(&archives, 1);
        assert_eq!(
            evicted,
            vec![PathBuf::from("a.tar.zst"), PathBuf::from("b.tar.zst")]
        );
    }

    #[test]
    fn test_empty_set_is_not_an_error() {
        assert!(select_expired(&[], 1, now()).is_empty());
        assert!(select_over_size(&[], 0).is_empty());
        assert!(select_over_count(&[], 0).is_empty());
    }

    #[test]
    fn test_disabled_limits() {
        let limits = RetentionLimits::default();
        assert!(limits.is_disabled());

        let enabled = RetentionLimits {
            max_count: Some(3),
            ..Default::default()
        };
        assert!(!enabled.is_disabled());
    }
}
