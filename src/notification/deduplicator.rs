//! 闪光去重缓存 - 防止同一遭遇被重复通知
//!
//! ## 去重策略
//! 1. 以 (encounter_id, pokemon_id, form) 作为身份
//! 2. 第一次出现时记录时间，之后在保留窗口内一律跳过
//! 3. 每轮通知完成后清理超过保留窗口（默认 1 小时）的记录
//!
//! 缓存只在内存中，进程重启后清空（重启后可能重复通知一次）。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::event::ShinyKey;

/// 默认保留窗口（秒）
pub const DEFAULT_RETENTION_SECS: i64 = 3600;

/// 去重缓存：身份 -> 第一次出现的时间
#[derive(Debug, Default)]
pub struct ShinyCache {
    seen: HashMap<ShinyKey, DateTime<Utc>>,
}

impl ShinyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否是新事件（缓存中不存在）
    pub fn is_novel(&self, key: &ShinyKey) -> bool {
        !self.seen.contains_key(key)
    }

    /// 记录事件第一次出现的时间
    ///
    /// 已存在的记录保持原来的时间，不会被刷新。
    pub fn record(&mut self, key: ShinyKey, first_seen: DateTime<Utc>) {
        self.seen.entry(key).or_insert(first_seen);
    }

    /// 新事件则记录并返回 true
    pub fn check_and_record(&mut self, key: &ShinyKey, now: DateTime<Utc>) -> bool {
        if !self.is_novel(key) {
            debug!(key = %key, "Shiny deduplicated (already notified)");
            return false;
        }
        self.record(key.clone(), now);
        true
    }

    /// 清理超过保留窗口的记录，返回清理数量
    ///
    /// `now - first_seen > retention` 的记录会被删除。
    pub fn evict(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, first_seen| now.signed_duration_since(*first_seen) <= retention);
        let evicted = before - self.seen.len();

        if evicted > 0 {
            debug!(evicted, remaining = self.seen.len(), "Evicted expired shinies");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn contains(&self, key: &ShinyKey) -> bool {
        self.seen.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(id: &str) -> ShinyKey {
        ShinyKey {
            encounter_id: id.to_string(),
            pokemon_id: 129,
            form: 0,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn retention() -> Duration {
        Duration::seconds(DEFAULT_RETENTION_SECS)
    }

    #[test]
    fn test_unknown_key_is_novel() {
        let cache = ShinyCache::new();
        assert!(cache.is_novel(&key("a")));
    }

    #[test]
    fn test_recorded_key_is_not_novel() {
        let mut cache = ShinyCache::new();
        cache.record(key("a"), at(1_000));

        assert!(!cache.is_novel(&key("a")));
        // 不同身份不受影响
        assert!(cache.is_novel(&key("b")));
    }

    #[test]
    fn test_same_encounter_different_form_is_novel() {
        let mut cache = ShinyCache::new();
        cache.record(key("a"), at(1_000));

        let mut other_form = key("a");
        other_form.form = 1;
        assert!(cache.is_novel(&other_form));
    }

    #[test]
    fn test_suppressed_until_retention_exceeded() {
        let mut cache = ShinyCache::new();
        cache.record(key("a"), at(1_000));

        // 刚好等于保留窗口：仍然保留
        assert_eq!(cache.evict(at(1_000 + DEFAULT_RETENTION_SECS), retention()), 0);
        assert!(!cache.is_novel(&key("a")));

        // 超过保留窗口：被清理，重新视为新事件
        assert_eq!(cache.evict(at(1_001 + DEFAULT_RETENTION_SECS), retention()), 1);
        assert!(cache.is_novel(&key("a")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_keeps_recent_entries() {
        let mut cache = ShinyCache::new();
        cache.record(key("old"), at(0));
        cache.record(key("new"), at(3_000));

        let evicted = cache.evict(at(4_000), retention());
        assert_eq!(evicted, 1);
        assert!(cache.contains(&key("new")));
        assert!(!cache.contains(&key("old")));
    }

    #[test]
    fn test_record_does_not_refresh_first_seen() {
        let mut cache = ShinyCache::new();
        cache.record(key("a"), at(0));
        cache.record(key("a"), at(3_000));

        // 按第一次出现时间计算
        cache.evict(at(3_700), retention());
        assert!(cache.is_novel(&key("a")));
    }

    #[test]
    fn test_check_and_record_within_one_batch() {
        let mut cache = ShinyCache::new();
        assert!(cache.check_and_record(&key("a"), at(10)));
        assert!(!cache.check_and_record(&key("a"), at(10)));
        assert_eq!(cache.len(), 1);
    }
}
