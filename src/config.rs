//! 配置加载
//!
//! 默认读取 `~/.config/shiny-notifier/config.json`，支持 `${VAR}` 环境变量替换。
//!
//! ```json
//! {
//!   "source": { "type": "madmin", "url": "http://madmin:5000", "username": "admin", "password": "${MADMIN_PASSWORD}" },
//!   "discord_webhook": "${DISCORD_WEBHOOK_URL}",
//!   "telegram": { "bot_token": "${TELEGRAM_TOKEN}", "chat_id": "-100123456" },
//!   "interval_secs": 60,
//!   "locale": "en",
//!   "persist_log": true
//! }
//! ```
//!
//! 可选项留空即禁用对应功能；缺少数据源或语言不支持时返回 `ConfigError`。

use chrono::{Duration, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::locale::Locale;

fn default_interval() -> u64 {
    60
}

fn default_retention() -> u64 {
    3600
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_db_port() -> u16 {
    3306
}

fn default_max_backfill() -> u64 {
    3600
}

/// 各时长配置项的上限（30 天）
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 3600;

/// 数据源配置
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSettings {
    /// MADmin HTTP 接口
    Madmin {
        url: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    /// MAD MySQL 数据库
    Database {
        host: String,
        #[serde(default = "default_db_port")]
        port: u16,
        user: String,
        #[serde(default)]
        password: String,
        database: String,
        #[serde(default)]
        icon_base_url: Option<String>,
    },
}

/// Telegram 配置（token 或 chat_id 为空时禁用）
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub chat_id: String,
}

/// chat_id 在配置里可能写成数字
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: Option<SourceSettings>,

    #[serde(default)]
    pub discord_webhook: Option<String>,

    #[serde(default)]
    pub telegram: TelegramSettings,

    /// 轮询间隔（秒）
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// 第一轮回溯时长（秒），默认等于轮询间隔
    #[serde(default)]
    pub lookback_secs: Option<u64>,

    /// 去重保留窗口（秒）
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// 数据源长时间不可用后，单个窗口最多回补的时长（秒）
    #[serde(default = "default_max_backfill")]
    pub max_backfill_secs: u64,

    #[serde(default = "default_locale")]
    pub locale: String,

    /// 宝可梦名称文件（数据库后端使用）
    #[serde(default)]
    pub names_file: Option<PathBuf>,

    /// 摘要时间显示的 UTC 偏移（小时）
    #[serde(default)]
    pub utc_offset_hours: i32,

    /// 是否把发送过的通知写入本地文件
    #[serde(default)]
    pub persist_log: bool,

    #[serde(default = "default_backoff_ms")]
    pub telegram_retry_backoff_ms: u64,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl AppConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("shiny-notifier")
            .join("config.json")
    }

    /// 从指定路径加载（None 使用默认路径）
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::default_path();
        let path = path.unwrap_or(&default_path);

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json(&content, &path.display().to_string())
    }

    /// 从 JSON 文本解析并校验
    pub fn from_json(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let config: AppConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;

        config.validate()?;

        debug!(
            interval_secs = config.interval_secs,
            discord = config.discord_enabled(),
            telegram = config.telegram_enabled(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.source {
            None => return Err(ConfigError::MissingField("source".to_string())),
            Some(SourceSettings::Madmin { url, .. }) => {
                if url.trim().is_empty() {
                    return Err(ConfigError::MissingField("source.url".to_string()));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(invalid("source.url", "must start with http:// or https://"));
                }
            }
            Some(SourceSettings::Database { host, user, database, .. }) => {
                for (field, value) in [("source.host", host), ("source.user", user), ("source.database", database)] {
                    if value.trim().is_empty() {
                        return Err(ConfigError::MissingField(field.to_string()));
                    }
                }
            }
        }

        let durations = [
            ("interval_secs", Some(self.interval_secs)),
            ("lookback_secs", self.lookback_secs),
            ("retention_secs", Some(self.retention_secs)),
            ("max_backfill_secs", Some(self.max_backfill_secs)),
        ];
        for (field, value) in durations {
            match value {
                Some(0) if field != "lookback_secs" => {
                    return Err(invalid(field, "must be greater than 0"));
                }
                Some(secs) if secs > MAX_DURATION_SECS => {
                    return Err(invalid(field, "must not exceed 30 days"));
                }
                _ => {}
            }
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(invalid("utc_offset_hours", "must be between -12 and 14"));
        }

        self.locale()?;
        Ok(())
    }

    pub fn locale(&self) -> Result<Locale, ConfigError> {
        self.locale.parse()
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub fn lookback(&self) -> Result<Duration, ConfigError> {
        seconds("lookback_secs", self.lookback_secs.unwrap_or(self.interval_secs))
    }

    pub fn retention(&self) -> Result<Duration, ConfigError> {
        seconds("retention_secs", self.retention_secs)
    }

    pub fn max_backfill(&self) -> Result<Duration, ConfigError> {
        seconds("max_backfill_secs", self.max_backfill_secs)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| invalid("utc_offset_hours", "out of range"))
    }

    /// 非空的 Discord webhook 地址
    pub fn discord_webhook(&self) -> Option<&str> {
        self.discord_webhook
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty() && !is_placeholder(url))
    }

    pub fn discord_enabled(&self) -> bool {
        self.discord_webhook().is_some()
    }

    pub fn telegram_enabled(&self) -> bool {
        let token = self.telegram.bot_token.trim();
        let chat = self.telegram.chat_id.trim();
        !token.is_empty() && !chat.is_empty() && !is_placeholder(token) && !is_placeholder(chat)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// u64 秒数转换为 chrono 时长，超出范围返回错误而不是 panic
fn seconds(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| invalid(field, "out of range"))
}

/// 未设置的环境变量会保留 `${VAR}` 原样，视为未配置
fn is_placeholder(value: &str) -> bool {
    value.starts_with("${") && value.ends_with('}')
}

/// 替换 `${VAR}` 为环境变量的值
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| invalid("pattern", &e.to_string()))?;

    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string())
}
