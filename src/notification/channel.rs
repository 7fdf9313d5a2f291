//! 通知渠道 trait 定义

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SinkError;
use crate::event::ShinyEvent;

/// 通知消息
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    /// 摘要内容（每个事件一行，Discord 风格 markdown）
    pub digest: String,
    /// 本轮第一个新事件（用于发送者名称和头像）
    pub lead: ShinyEvent,
    /// 本轮新事件数量
    pub count: usize,
}

impl NotificationMessage {
    pub fn new(digest: impl Into<String>, lead: ShinyEvent) -> Self {
        Self {
            digest: digest.into(),
            lead,
            count: 1,
        }
    }

    /// 设置事件数量
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过
    Skipped(String),
    /// 发送失败（已记录日志）
    Failed(String),
}

impl SendResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }
}

/// 通知渠道 trait
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 发送消息
    async fn send(&self, message: &NotificationMessage) -> Result<SendResult, SinkError>;
}
