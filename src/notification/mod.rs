//! 通知层 - 去重、格式化、分发
//!
//! # 设计目标
//! 1. 统一接口：所有渠道实现 `NotificationChannel` trait
//! 2. 渠道解耦：每个渠道独立发送，一个失败不影响另一个
//! 3. 按配置注册：`NotificationBuilder` 只注册配置完整的渠道
//!
//! # 使用示例
//! ```ignore
//! use shiny_notifier::notification::NotificationBuilder;
//!
//! let dispatcher = NotificationBuilder::new()
//!     .discord_webhook("https://discord.com/api/webhooks/...")
//!     .build()?;
//!
//! dispatcher.dispatch(&digest, &events[0], events.len()).await;
//! ```

pub mod builder;
pub mod channel;
pub mod channels;
pub mod deduplicator;
pub mod dispatcher;
pub mod formatter;
pub mod store;

pub use builder::NotificationBuilder;
pub use channel::{NotificationChannel, NotificationMessage, SendResult};
pub use deduplicator::ShinyCache;
pub use dispatcher::NotificationDispatcher;
pub use formatter::DigestFormatter;
pub use store::{NotificationRecord, NotificationStore};
