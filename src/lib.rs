//! Shiny Notifier - 轮询 MAD 闪光遭遇并推送到 Discord / Telegram

pub mod config;
pub mod error;
pub mod event;
pub mod locale;
pub mod notification;
pub mod scheduler;
pub mod source;

pub use config::{AppConfig, SourceSettings, TelegramSettings};
pub use error::{ConfigError, SinkError, SourceError};
pub use event::{ShinyEvent, ShinyKey};
pub use locale::{Locale, NameTable};
pub use notification::{
    DigestFormatter, NotificationBuilder, NotificationChannel, NotificationDispatcher,
    NotificationMessage, NotificationRecord, NotificationStore, SendResult, ShinyCache,
};
pub use scheduler::{run_cycles, run_forever, Cycle, CycleReport, Poller};
pub use source::{EventSource, PollCursor, PollWindow};
