//! Telegram Bot API 渠道
//!
//! `GET https://api.telegram.org/bot<token>/sendMessage?chat_id=..&parse_mode=markdown&text=..`
//!
//! 失败后等待固定时间重试一次，第二次失败只记录日志，不向上抛错。

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::SinkError;
use crate::notification::channel::{NotificationChannel, NotificationMessage, SendResult};

use super::truncate_chars;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// sendMessage 文本长度上限
const MAX_TEXT_CHARS: usize = 4096;

/// 默认重试等待时间
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Telegram 渠道配置
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// API 根地址
    pub api_base: String,
    pub retry_backoff: Duration,
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            timeout_secs: 30,
        }
    }

    /// token 和 chat_id 都非空时才启用
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

/// Telegram 渠道
pub struct TelegramChannel {
    client: Client,
    config: TelegramConfig,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    async fn deliver(&self, text: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("chat_id", self.config.chat_id.as_str()),
                ("parse_mode", "markdown"),
                ("text", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status {
            channel: "telegram".to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<SendResult, SinkError> {
        let text = render_text(&message.digest);

        match retry_once(self.config.retry_backoff, || self.deliver(&text)).await {
            Ok(()) => {
                info!(channel = "telegram", count = message.count, "Message sent successfully");
                Ok(SendResult::Sent)
            }
            Err(e) => {
                error!(
                    channel = "telegram",
                    error = %e,
                    "Failed to send message after retry, giving up"
                );
                Ok(SendResult::Failed(e.to_string()))
            }
        }
    }
}

/// Telegram 旧版 markdown 只认单个 `*` 作为粗体
pub fn to_telegram_markdown(digest: &str) -> String {
    digest.replace("**", "*")
}

/// 转换为 Telegram markdown 并截断到 sendMessage 上限
fn render_text(digest: &str) -> String {
    truncate_chars(&to_telegram_markdown(digest), MAX_TEXT_CHARS)
}

/// 执行操作，失败后等待 `backoff` 再重试一次
pub async fn retry_once<T, E, F, Fut>(backoff: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(
                error = %e,
                backoff_ms = backoff.as_millis() as u64,
                "Delivery failed, retrying once"
            );
            sleep(backoff).await;
            op().await
        }
    }
}
