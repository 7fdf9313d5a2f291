//! 通知系统构建器 - 根据配置注册渠道

use super::channels::discord::{DiscordChannel, DiscordConfig};
use super::channels::telegram::{TelegramChannel, TelegramConfig};
use super::dispatcher::NotificationDispatcher;
use crate::config::{AppConfig, SourceSettings};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 通知系统构建器
///
/// 未配置（或配置为空）的渠道直接跳过，不算错误。
pub struct NotificationBuilder {
    discord_webhook: Option<String>,
    asset_base_url: Option<String>,
    header: String,
    telegram: Option<TelegramConfig>,
    timeout_secs: u64,
    dry_run: bool,
}

impl NotificationBuilder {
    pub fn new() -> Self {
        Self {
            discord_webhook: None,
            asset_base_url: None,
            header: String::new(),
            telegram: None,
            timeout_secs: 30,
            dry_run: false,
        }
    }

    /// 从应用配置初始化
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let locale = config.locale()?;

        // MADmin 返回的图片是相对路径，以 MADmin 地址为根
        let asset_base_url = match &config.source {
            Some(SourceSettings::Madmin { url, .. }) => Some(url.clone()),
            _ => None,
        };

        let telegram = config.telegram_enabled().then(|| {
            let mut telegram = TelegramConfig::new(
                config.telegram.bot_token.trim(),
                config.telegram.chat_id.trim(),
            );
            telegram.retry_backoff = Duration::from_millis(config.telegram_retry_backoff_ms);
            telegram.timeout_secs = config.request_timeout_secs;
            telegram
        });

        Ok(Self {
            discord_webhook: config.discord_webhook().map(str::to_string),
            asset_base_url,
            header: locale.phrases().header.to_string(),
            telegram,
            timeout_secs: config.request_timeout_secs,
            dry_run: false,
        })
    }

    /// 设置 Discord webhook
    pub fn discord_webhook(mut self, url: impl Into<String>) -> Self {
        self.discord_webhook = Some(url.into());
        self
    }

    /// 设置 Telegram 配置
    pub fn telegram(mut self, config: TelegramConfig) -> Self {
        self.telegram = Some(config);
        self
    }

    /// 设置 dry-run 模式
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 构建 NotificationDispatcher
    pub fn build(self) -> Result<NotificationDispatcher> {
        let mut dispatcher = NotificationDispatcher::new().with_dry_run(self.dry_run);

        match self.discord_webhook.filter(|url| !url.trim().is_empty()) {
            Some(webhook_url) => {
                info!(channel = "discord", "Discord webhook configured");
                let channel = DiscordChannel::new(DiscordConfig {
                    webhook_url,
                    asset_base_url: self.asset_base_url,
                    header: self.header,
                    timeout_secs: self.timeout_secs,
                })?;
                dispatcher.register_channel(Arc::new(channel));
            }
            None => debug!(channel = "discord", "No webhook configured, skipping"),
        }

        match self.telegram.filter(TelegramConfig::is_configured) {
            Some(config) => {
                info!(channel = "telegram", chat_id = %config.chat_id, "Telegram bot configured");
                dispatcher.register_channel(Arc::new(TelegramChannel::new(config)?));
            }
            None => debug!(channel = "telegram", "No bot token / chat id configured, skipping"),
        }

        Ok(dispatcher)
    }
}

impl Default for NotificationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
