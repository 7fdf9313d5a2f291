//! 轮询调度 - 固定间隔执行一轮「获取 → 去重 → 格式化 → 发送 → 清理」
//!
//! 每轮串行执行，不会并发：一轮耗时超过间隔时，下一轮顺延而不是叠加。
//! 单轮失败只记录日志，不影响下一轮。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::SourceError;
use crate::event::ShinyEvent;
use crate::notification::deduplicator::DEFAULT_RETENTION_SECS;
use crate::notification::{
    DigestFormatter, NotificationDispatcher, NotificationRecord, NotificationStore, SendResult,
    ShinyCache,
};
use crate::source::{EventSource, PollCursor, PollWindow};

/// 一轮轮询的结果
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub window: PollWindow,
    /// 数据源返回的事件数
    pub fetched: usize,
    /// 新事件数
    pub novel: usize,
    /// 各渠道发送结果（没有新事件时为空）
    pub results: Vec<(String, SendResult)>,
    /// 本轮清理的缓存记录数
    pub evicted: usize,
}

impl CycleReport {
    pub fn dispatched(&self) -> bool {
        self.novel > 0
    }
}

/// 可被调度的一轮任务
#[async_trait]
pub trait Cycle: Send {
    async fn run_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<CycleReport>;
}

/// 立即执行一轮，此后每隔 `interval` 执行一轮，直到进程退出
pub async fn run_forever<C: Cycle + ?Sized>(interval: std::time::Duration, cycle: &mut C) {
    run_loop(interval, cycle, None).await
}

/// 执行指定轮数后返回
pub async fn run_cycles<C: Cycle + ?Sized>(interval: std::time::Duration, cycle: &mut C, count: u64) {
    run_loop(interval, cycle, Some(count)).await
}

async fn run_loop<C: Cycle + ?Sized>(
    interval: std::time::Duration,
    cycle: &mut C,
    limit: Option<u64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut completed: u64 = 0;
    loop {
        if limit.is_some_and(|limit| completed >= limit) {
            break;
        }

        ticker.tick().await;

        match cycle.run_cycle(Utc::now()).await {
            Ok(report) => debug!(
                window = %report.window,
                fetched = report.fetched,
                novel = report.novel,
                evicted = report.evicted,
                "Poll cycle finished"
            ),
            Err(e) => error!(error = %format!("{:#}", e), "Poll cycle failed"),
        }

        completed += 1;
    }
}

/// 轮询器：持有游标和去重缓存，每轮由调度器驱动
pub struct Poller {
    source: Box<dyn EventSource>,
    cache: ShinyCache,
    cursor: PollCursor,
    formatter: DigestFormatter,
    dispatcher: NotificationDispatcher,
    store: Option<NotificationStore>,
    retention: Duration,
}

impl Poller {
    pub fn new(
        source: Box<dyn EventSource>,
        formatter: DigestFormatter,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            source,
            cache: ShinyCache::new(),
            cursor: PollCursor::new(Duration::seconds(60)),
            formatter,
            dispatcher,
            store: None,
            retention: Duration::seconds(DEFAULT_RETENTION_SECS),
        }
    }

    /// 第一轮回溯时长
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.cursor = PollCursor::new(lookback).with_max_span(self.cursor.max_span());
        self
    }

    /// 数据源恢复后单个窗口最多回补的时长
    pub fn with_max_backfill(mut self, max_backfill: Duration) -> Self {
        self.cursor = self.cursor.clone().with_max_span(max_backfill);
        self
    }

    /// 去重保留窗口
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// 启用本地通知记录
    pub fn with_store(mut self, store: NotificationStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(&self) -> &ShinyCache {
        &self.cache
    }

    pub fn cursor(&self) -> &PollCursor {
        &self.cursor
    }

    /// 执行一轮
    ///
    /// 数据源不可用时游标不前进，下一轮会覆盖这段时间（最多回补 max_backfill）。
    /// 响应无法解析时游标越过本窗口，避免同一份坏数据让之后每一轮都失败。
    pub async fn poll_once(&mut self, now: DateTime<Utc>) -> Result<CycleReport, SourceError> {
        let window = self.cursor.window(now);
        if let Some(position) = self.cursor.position().filter(|p| *p < window.start) {
            warn!(
                skipped_from = position.timestamp(),
                skipped_to = window.start.timestamp(),
                "Outage longer than max backfill, skipping older range"
            );
        }

        let events = match self.source.fetch(window).await {
            Ok(events) => events,
            Err(e @ SourceError::Malformed { .. }) => {
                warn!(window = %window, "Unreadable source payload, moving past window");
                self.cursor.advance(&window);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        self.cursor.advance(&window);

        let fetched = events.len();
        // 每个新事件立即写入缓存，同一批里的重复事件只通知一次
        let novel: Vec<ShinyEvent> = events
            .into_iter()
            .filter(|event| self.cache.check_and_record(event.key(), now))
            .collect();

        let digest = self.formatter.format(&novel);
        let results = match novel.first() {
            Some(lead) if !digest.is_empty() => {
                info!(
                    source = self.source.name(),
                    window = %window,
                    count = novel.len(),
                    "New shinies found, dispatching"
                );
                let results = self.dispatcher.dispatch(&digest, lead, novel.len()).await;
                self.persist(now, lead, novel.len(), &digest, &results);
                results
            }
            _ => Vec::new(),
        };

        let evicted = self.cache.evict(now, self.retention);

        Ok(CycleReport {
            window,
            fetched,
            novel: novel.len(),
            results,
            evicted,
        })
    }

    fn persist(
        &self,
        now: DateTime<Utc>,
        lead: &ShinyEvent,
        count: usize,
        digest: &str,
        results: &[(String, SendResult)],
    ) {
        let Some(store) = &self.store else {
            return;
        };

        let record = NotificationRecord::new(now, lead.name.clone(), count, digest, results);
        if let Err(e) = store.append(&record) {
            warn!(path = %store.path().display(), error = %e, "Failed to persist notification");
        }
    }
}

#[async_trait]
impl Cycle for Poller {
    async fn run_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<CycleReport> {
        Ok(self.poll_once(now).await?)
    }
}
