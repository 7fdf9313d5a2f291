//! 通知分发器 - 管理多个渠道并路由消息

use super::channel::{NotificationChannel, NotificationMessage, SendResult};
use crate::event::ShinyEvent;
use std::sync::Arc;
use tracing::{info, warn};

/// 通知分发器 - 管理多个渠道并路由消息
pub struct NotificationDispatcher {
    /// 所有注册的渠道
    channels: Vec<Arc<dyn NotificationChannel>>,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl NotificationDispatcher {
    /// 创建新的分发器
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册渠道
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), "Registering notification channel");
        self.channels.push(channel);
    }

    /// 发送摘要到所有渠道
    pub async fn dispatch(&self, digest: &str, lead: &ShinyEvent, count: usize) -> Vec<(String, SendResult)> {
        let message = NotificationMessage::new(digest, lead.clone()).with_count(count);
        self.send(&message).await
    }

    /// 逐个渠道发送，单个渠道失败不影响其他渠道
    pub async fn send(&self, message: &NotificationMessage) -> Vec<(String, SendResult)> {
        let mut results = Vec::with_capacity(self.channels.len());

        if self.channels.is_empty() {
            info!(count = message.count, digest = %message.digest, "No channel registered, digest not sent");
        }

        for channel in &self.channels {
            let name = channel.name().to_string();

            if self.dry_run {
                info!(channel = %name, digest = %message.digest, "[DRY-RUN] Would send notification");
                results.push((name, SendResult::Skipped("dry-run".to_string())));
                continue;
            }

            let result = match channel.send(message).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(channel = %name, error = %e, "Channel send failed");
                    SendResult::Failed(e.to_string())
                }
            };

            results.push((name, result));
        }

        results
    }

    /// 获取已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 获取已注册的渠道名称
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::event::sample_event;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 测试用的 mock 渠道
    struct MockChannel {
        name: String,
        fail: bool,
        send_count: AtomicUsize,
    }

    impl MockChannel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail: false,
                send_count: AtomicUsize::new(0),
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        fn get_send_count(&self) -> usize {
            self.send_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for MockChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _message: &NotificationMessage) -> Result<SendResult, SinkError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SinkError::Status {
                    channel: self.name.clone(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(SendResult::Sent)
        }
    }

    #[test]
    fn test_dispatcher_register_channel() {
        let mut dispatcher = NotificationDispatcher::new();
        assert_eq!(dispatcher.channel_count(), 0);

        dispatcher.register_channel(Arc::new(MockChannel::new("test")));
        assert_eq!(dispatcher.channel_count(), 1);
        assert_eq!(dispatcher.channel_names(), vec!["test"]);
    }

    #[tokio::test]
    async fn test_dispatcher_send() {
        let mut dispatcher = NotificationDispatcher::new();
        let channel = Arc::new(MockChannel::new("test"));
        dispatcher.register_channel(channel.clone());

        let results = dispatcher
            .dispatch("- **Magikarp**", &sample_event("1", "Magikarp"), 1)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "test");
        assert_eq!(results[0].1, SendResult::Sent);
        assert_eq!(channel.get_send_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let mut dispatcher = NotificationDispatcher::new();
        let broken = Arc::new(MockChannel::failing("discord"));
        let healthy = Arc::new(MockChannel::new("telegram"));
        dispatcher.register_channel(broken.clone());
        dispatcher.register_channel(healthy.clone());

        let results = dispatcher
            .dispatch("digest", &sample_event("1", "Magikarp"), 1)
            .await;

        assert!(matches!(results[0].1, SendResult::Failed(_)));
        assert_eq!(results[1].1, SendResult::Sent);
        assert_eq!(healthy.get_send_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_dry_run() {
        let mut dispatcher = NotificationDispatcher::new().with_dry_run(true);
        let channel = Arc::new(MockChannel::new("test"));
        dispatcher.register_channel(channel.clone());

        let results = dispatcher
            .dispatch("digest", &sample_event("1", "Magikarp"), 1)
            .await;

        assert_eq!(results[0].1, SendResult::Skipped("dry-run".to_string()));
        assert_eq!(channel.get_send_count(), 0); // 不应该实际发送
    }

    #[tokio::test]
    async fn test_no_channels_is_not_an_error() {
        let dispatcher = NotificationDispatcher::new();
        let results = dispatcher
            .dispatch("digest", &sample_event("1", "Magikarp"), 1)
            .await;
        assert!(results.is_empty());
    }
}
