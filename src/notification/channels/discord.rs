//! Discord Webhook 渠道
//!
//! POST `{username, avatar_url, content}`，发送者名称和头像取自本轮第一个新事件。
//! 不重试：失败只记录日志，不影响其他渠道。

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

use crate::error::SinkError;
use crate::event::ShinyEvent;
use crate::notification::channel::{NotificationChannel, NotificationMessage, SendResult};

use super::truncate_chars;

/// Discord 单条消息长度上限
const MAX_CONTENT_CHARS: usize = 2000;

/// Discord 渠道配置
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook_url: String,
    /// 相对图片路径的根地址（通常是 MADmin 地址）
    pub asset_base_url: Option<String>,
    /// 摘要前的标题行
    pub header: String,
    pub timeout_secs: u64,
}

/// Webhook 请求载荷
#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub content: String,
}

/// Discord 渠道
pub struct DiscordChannel {
    client: Client,
    config: DiscordConfig,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// 构建载荷
    pub fn build_payload(&self, message: &NotificationMessage) -> WebhookPayload {
        let content = if self.config.header.is_empty() {
            message.digest.clone()
        } else {
            format!("{}\n{}", self.config.header, message.digest)
        };

        WebhookPayload {
            username: message.lead.name.clone(),
            avatar_url: resolve_avatar_url(&message.lead, self.config.asset_base_url.as_deref()),
            content: truncate_chars(&content, MAX_CONTENT_CHARS),
        }
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<SendResult, SinkError> {
        let payload = self.build_payload(message);

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(channel = "discord", count = message.count, "Webhook delivered");
            return Ok(SendResult::Sent);
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            channel = "discord",
            status = %status,
            body = %body,
            "Webhook rejected"
        );
        Err(SinkError::Status {
            channel: "discord".to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// 头像 URL：绝对地址直接使用，相对路径拼接到根地址上
pub fn resolve_avatar_url(event: &ShinyEvent, base: Option<&str>) -> Option<String> {
    let image = event.image.as_deref()?.trim();
    if image.is_empty() {
        return None;
    }
    if image.starts_with("http://") || image.starts_with("https://") {
        return Some(image.to_string());
    }

    let base = base.map(str::trim).filter(|b| !b.is_empty())?;
    Some(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        image.trim_start_matches('/')
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::sample_event;

    fn channel(base: Option<&str>) -> DiscordChannel {
        DiscordChannel::new(DiscordConfig {
            webhook_url: "https://discord.com/api/webhooks/1/abc".to_string(),
            asset_base_url: base.map(str::to_string),
            header: "Encountered shinies:".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_payload_uses_lead_event() {
        let message = NotificationMessage::new("- **Magikarp**", sample_event("1", "Magikarp"));
        let payload = channel(Some("http://madmin:5000/")).build_payload(&message);

        assert_eq!(payload.username, "Magikarp");
        assert_eq!(
            payload.avatar_url.as_deref(),
            Some("http://madmin:5000/asset/pokemon_icons/pokemon_icon_001_00.png")
        );
        assert_eq!(payload.content, "Encountered shinies:\n- **Magikarp**");
    }

    #[test]
    fn test_payload_json_shape() {
        let message = NotificationMessage::new("digest", sample_event("1", "Magikarp"));
        let payload = channel(Some("http://madmin")).build_payload(&message);
        let json = serde_json::to_value(&payload).unwrap();

        assert!(json.get("username").is_some());
        assert!(json.get("avatar_url").is_some());
        assert!(json.get("content").is_some());
    }

    #[test]
    fn test_absolute_image_used_as_is() {
        let mut event = sample_event("1", "Magikarp");
        event.image = Some("https://cdn.example.com/129.png".to_string());
        assert_eq!(
            resolve_avatar_url(&event, Some("http://madmin")).as_deref(),
            Some("https://cdn.example.com/129.png")
        );
    }

    #[test]
    fn test_relative_image_without_base_is_omitted() {
        let event = sample_event("1", "Magikarp");
        assert!(resolve_avatar_url(&event, None).is_none());

        let message = NotificationMessage::new("digest", event);
        let json = serde_json::to_value(channel(None).build_payload(&message)).unwrap();
        assert!(json.get("avatar_url").is_none());
    }

    #[test]
    fn test_long_digest_truncated_to_limit() {
        let digest = "- **Magikarp** at **12:30:15**\n".repeat(200);
        let message = NotificationMessage::new(digest, sample_event("1", "Magikarp"));
        let payload = channel(None).build_payload(&message);

        assert_eq!(payload.content.chars().count(), MAX_CONTENT_CHARS);
        assert!(payload.content.ends_with("..."));
    }
}
