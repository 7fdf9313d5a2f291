//! 通知存储 - 本地 JSONL 文件读写
//!
//! 只有配置 `persist_log = true` 时才写入。写入失败只记录日志。

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::channel::SendResult;

/// 通知记录（JSONL 格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// ISO8601 时间戳
    pub ts: DateTime<Utc>,
    /// 第一个事件的名称
    pub lead: String,
    /// 事件数量
    pub count: usize,
    /// 摘要内容
    pub digest: String,
    /// 发送成功的渠道
    #[serde(default)]
    pub delivered_to: Vec<String>,
    /// 发送失败的渠道
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl NotificationRecord {
    pub fn new(
        ts: DateTime<Utc>,
        lead: impl Into<String>,
        count: usize,
        digest: impl Into<String>,
        results: &[(String, SendResult)],
    ) -> Self {
        let delivered_to = results
            .iter()
            .filter(|(_, r)| r.is_sent())
            .map(|(name, _)| name.clone())
            .collect();
        let failed = results
            .iter()
            .filter(|(_, r)| matches!(r, SendResult::Failed(_)))
            .map(|(name, _)| name.clone())
            .collect();

        Self {
            ts,
            lead: lead.into(),
            count,
            digest: digest.into(),
            delivered_to,
            failed,
        }
    }
}

const MAX_NOTIFICATIONS: usize = 500;
const KEEP_AFTER_CLEANUP: usize = 250;
/// 估算行数用的平均行长
const AVG_LINE_BYTES: u64 = 300;

/// 通知存储
#[derive(Debug, Clone)]
pub struct NotificationStore {
    path: PathBuf,
}

impl NotificationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认存储文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("shiny-notifier")
            .join("notifications.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加通知记录（带文件锁）
    pub fn append(&self, record: &NotificationRecord) -> Result<()> {
        use fs2::FileExt;

        // 确保目录存在
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        file.lock_exclusive()?;
        let mut file = file;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.unlock()?;

        self.maybe_cleanup()?;
        Ok(())
    }

    /// 读取最近 N 条通知
    pub fn read_recent(&self, n: usize) -> Vec<NotificationRecord> {
        let records = self.read_all();
        let start = records.len().saturating_sub(n);
        let mut recent = records[start..].to_vec();
        recent.sort_by_key(|r| r.ts);
        recent
    }

    fn read_all(&self) -> Vec<NotificationRecord> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect()
    }

    /// 文件估算超过上限时清理
    fn maybe_cleanup(&self) -> Result<()> {
        let len = fs::metadata(&self.path)?.len();
        if len / AVG_LINE_BYTES > MAX_NOTIFICATIONS as u64 {
            self.cleanup()?;
        }
        Ok(())
    }

    /// 执行清理（保留最近的记录）
    fn cleanup(&self) -> Result<()> {
        use fs2::FileExt;

        let file = File::open(&self.path)?;

        // 独占锁用于清理
        file.lock_exclusive()?;

        let records: Vec<NotificationRecord> = BufReader::new(&file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        if records.len() <= MAX_NOTIFICATIONS {
            file.unlock()?;
            return Ok(());
        }

        // 保留最后 KEEP_AFTER_CLEANUP 条
        let start = records.len().saturating_sub(KEEP_AFTER_CLEANUP);

        // 写入临时文件后原子替换
        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp_file = File::create(&temp_path)?;
            for record in &records[start..] {
                writeln!(temp_file, "{}", serde_json::to_string(record)?)?;
            }
        }
        fs::rename(&temp_path, &self.path)?;

        file.unlock()?;
        Ok(())
    }
}
