//! 错误类型
//!
//! - `ConfigError`：启动前的致命错误，进程直接退出
//! - `SourceError`：单轮轮询内的错误，记录日志后跳过本轮
//! - `SinkError`：单个渠道的发送错误，不影响其他渠道

use thiserror::Error;

use crate::source::PollWindow;

/// 配置错误（致命，进入轮询循环前退出）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unsupported locale: {0} (expected one of: en, de, fr)")]
    UnsupportedLocale(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// 数据源错误
#[derive(Debug, Error)]
pub enum SourceError {
    /// 网络 / 认证 / 查询失败
    #[error("source unavailable for window {window}: {reason}")]
    Unavailable { window: PollWindow, reason: String },

    /// 返回内容无法解析
    #[error("malformed source payload for window {window}: {reason}")]
    Malformed { window: PollWindow, reason: String },
}

impl SourceError {
    pub fn unavailable(window: PollWindow, reason: impl ToString) -> Self {
        Self::Unavailable {
            window,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(window: PollWindow, reason: impl ToString) -> Self {
        Self::Malformed {
            window,
            reason: reason.to_string(),
        }
    }
}

/// 渠道发送错误
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} returned status {status}: {body}")]
    Status {
        channel: String,
        status: u16,
        body: String,
    },
}
