//! 事件数据源 - 按时间窗口获取闪光遭遇
//!
//! 两种后端实现同一个 `EventSource` trait：
//! - `MadminSource`：MADmin HTTP 接口
//! - `DatabaseSource`：MAD MySQL 数据库
//!
//! 启动时根据配置选择其一。

pub mod database;
pub mod madmin;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

use crate::config::{AppConfig, SourceSettings};
use crate::error::SourceError;
use crate::event::ShinyEvent;
use crate::locale::NameTable;

pub use database::{DatabaseConfig, DatabaseSource};
pub use madmin::{MadminConfig, MadminSource};

/// 半开时间窗口 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PollWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// 起点（unix 秒，包含）
    pub fn from_ts(&self) -> i64 {
        self.start.timestamp()
    }

    /// 终点（unix 秒，不包含）
    pub fn to_ts(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for PollWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from_ts(), self.to_ts())
    }
}

/// 轮询游标
///
/// 第一轮从 `now - lookback` 开始；此后每次成功获取后移动到上一个窗口的终点，
/// 保证窗口之间既不重叠也没有空隙。游标只会前进。
///
/// 窗口起点不早于 `now - max_span`：数据源长时间不可用后，只回补最近这段时间。
#[derive(Debug, Clone)]
pub struct PollCursor {
    position: Option<DateTime<Utc>>,
    lookback: Duration,
    max_span: Duration,
}

/// 默认最大回补时长
pub const DEFAULT_MAX_SPAN_SECS: i64 = 3600;

impl PollCursor {
    pub fn new(lookback: Duration) -> Self {
        Self {
            position: None,
            lookback,
            max_span: Duration::seconds(DEFAULT_MAX_SPAN_SECS),
        }
    }

    /// 设置单个窗口的最大跨度（不小于 lookback）
    pub fn with_max_span(mut self, max_span: Duration) -> Self {
        self.max_span = max_span;
        self
    }

    pub fn max_span(&self) -> Duration {
        self.max_span.max(self.lookback)
    }

    /// 当前游标位置（第一轮之前为 None）
    pub fn position(&self) -> Option<DateTime<Utc>> {
        self.position
    }

    /// 计算本轮窗口
    pub fn window(&self, now: DateTime<Utc>) -> PollWindow {
        let floor = now - self.max_span();
        let start = self.position.unwrap_or(now - self.lookback).max(floor);
        // 时钟回拨时窗口宽度为 0，而不是倒退
        let end = now.max(start);
        PollWindow::new(start, end)
    }

    /// 窗口获取成功后推进游标
    pub fn advance(&mut self, window: &PollWindow) {
        let next = match self.position {
            Some(current) => current.max(window.end),
            None => window.end,
        };
        self.position = Some(next);
    }
}

/// 事件数据源
#[async_trait]
pub trait EventSource: Send + Sync {
    /// 数据源名称（用于日志）
    fn name(&self) -> &str;

    /// 获取窗口内的所有闪光遭遇，没有数据时返回空列表
    async fn fetch(&self, window: PollWindow) -> Result<Vec<ShinyEvent>, SourceError>;
}

/// 根据配置创建数据源
pub fn from_config(config: &AppConfig) -> anyhow::Result<Box<dyn EventSource>> {
    let timeout_secs = config.request_timeout_secs;

    match &config.source {
        Some(SourceSettings::Madmin { url, username, password }) => {
            let source = MadminSource::new(MadminConfig {
                url: url.clone(),
                username: username.clone(),
                password: password.clone(),
                timeout_secs,
                local_offset: config.utc_offset()?,
            })?;
            Ok(Box::new(source))
        }
        Some(SourceSettings::Database {
            host,
            port,
            user,
            password,
            database,
            icon_base_url,
        }) => {
            let names = match &config.names_file {
                Some(path) => NameTable::load(path)?,
                None => NameTable::new(),
            };
            let source = DatabaseSource::new(
                DatabaseConfig {
                    host: host.clone(),
                    port: *port,
                    user: user.clone(),
                    password: password.clone(),
                    database: database.clone(),
                    icon_base_url: icon_base_url.clone(),
                    timeout_secs,
                },
                names,
            );
            Ok(Box::new(source))
        }
        None => anyhow::bail!(crate::error::ConfigError::MissingField("source".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_first_window_seeds_from_lookback() {
        let cursor = PollCursor::new(Duration::seconds(60));
        let window = cursor.window(at(1_000));
        assert_eq!(window.from_ts(), 940);
        assert_eq!(window.to_ts(), 1_000);
    }

    #[test]
    fn test_windows_are_contiguous() {
        let mut cursor = PollCursor::new(Duration::seconds(60));

        let first = cursor.window(at(1_000));
        cursor.advance(&first);
        let second = cursor.window(at(1_075));
        cursor.advance(&second);
        let third = cursor.window(at(1_130));

        assert_eq!(second.start, first.end);
        assert_eq!(third.start, second.end);
        assert_eq!(third.to_ts(), 1_130);
    }

    #[test]
    fn test_window_not_advanced_covers_failed_range() {
        let mut cursor = PollCursor::new(Duration::seconds(60));
        let first = cursor.window(at(1_000));
        cursor.advance(&first);

        // 第二轮失败，没有 advance
        let _failed = cursor.window(at(1_060));
        let retry = cursor.window(at(1_120));
        assert_eq!(retry.from_ts(), 1_000);
        assert_eq!(retry.to_ts(), 1_120);
    }

    #[test]
    fn test_clock_going_backwards_never_rewinds_cursor() {
        let mut cursor = PollCursor::new(Duration::seconds(60));
        let first = cursor.window(at(1_000));
        cursor.advance(&first);

        let skewed = cursor.window(at(990));
        assert!(skewed.is_empty());
        assert_eq!(skewed.from_ts(), 1_000);

        cursor.advance(&skewed);
        assert_eq!(cursor.position(), Some(at(1_000)));
    }

    #[test]
    fn test_window_width_is_capped_after_outage() {
        let mut cursor = PollCursor::new(Duration::seconds(60)).with_max_span(Duration::seconds(600));
        let first = cursor.window(at(1_000));
        cursor.advance(&first);

        // 之后一直失败，没有 advance
        let late = cursor.window(at(10_000));
        assert_eq!(late.from_ts(), 9_400);
        assert_eq!(late.to_ts(), 10_000);

        cursor.advance(&late);
        assert_eq!(cursor.position(), Some(at(10_000)));
    }

    #[test]
    fn test_max_span_never_below_lookback() {
        let cursor = PollCursor::new(Duration::seconds(300)).with_max_span(Duration::seconds(60));
        assert_eq!(cursor.window(at(1_000)).from_ts(), 700);
    }

    #[test]
    fn test_from_config_selects_backend() {
        let madmin = AppConfig::from_json(
            r#"{"source": {"type": "madmin", "url": "http://madmin"}}"#,
            "test",
        )
        .unwrap();
        assert_eq!(from_config(&madmin).unwrap().name(), "madmin");

        let database = AppConfig::from_json(
            r#"{"source": {"type": "database", "host": "db", "user": "mad", "database": "mad"}}"#,
            "test",
        )
        .unwrap();
        // 连接在第一次查询时才建立
        assert_eq!(from_config(&database).unwrap().name(), "database");
    }

    #[test]
    fn test_window_display() {
        let window = PollWindow::new(at(10), at(20));
        assert_eq!(window.to_string(), "[10, 20)");
    }
}
