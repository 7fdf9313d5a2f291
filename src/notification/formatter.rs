//! 摘要格式化 - 将闪光事件渲染为通知文本
//!
//! 每个事件一行，顺序与输入一致：
//! ```text
//! - **Magikarp** at **12:30:15** until **12:45:00** by **atv-03** at **45.12345,3.45678**
//! ```
//! 没有事件时返回空字符串，调用方据此跳过发送。

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::event::ShinyEvent;
use crate::locale::Locale;

const TIME_FORMAT: &str = "%H:%M:%S";

/// 摘要格式化器
#[derive(Debug, Clone)]
pub struct DigestFormatter {
    locale: Locale,
    offset: FixedOffset,
}

impl DigestFormatter {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            offset: Utc.fix(),
        }
    }

    /// 设置时间显示的 UTC 偏移
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// 渲染摘要（每个事件一行）
    pub fn format(&self, events: &[ShinyEvent]) -> String {
        events
            .iter()
            .map(|event| self.format_line(event))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 带标题的完整消息（用于聊天 webhook）
    pub fn with_header(&self, digest: &str) -> String {
        format!("{}\n{}", self.locale.phrases().header, digest)
    }

    fn format_line(&self, event: &ShinyEvent) -> String {
        let p = self.locale.phrases();
        let mut line = format!("- **{}** {} **{}**", event.name, p.at, self.time(&event.detected_at));

        if let Some(expires_at) = &event.expires_at {
            line.push_str(&format!(" {} **{}**", p.until, self.time(expires_at)));
        }

        line.push_str(&format!(
            " {} **{}** {} **{}**",
            p.by,
            event.worker,
            p.at,
            format_coordinates(event.latitude, event.longitude)
        ));
        line
    }

    fn time(&self, t: &DateTime<Utc>) -> String {
        t.with_timezone(&self.offset).format(TIME_FORMAT).to_string()
    }
}

/// 坐标固定 5 位小数
pub fn format_coordinates(latitude: f64, longitude: f64) -> String {
    format!("{:.5},{:.5}", latitude, longitude)
}
