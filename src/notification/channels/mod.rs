//! 具体渠道实现

pub mod discord;
pub mod telegram;

pub use discord::{DiscordChannel, DiscordConfig};
pub use telegram::{TelegramChannel, TelegramConfig};

/// 截断到指定字符数（按字符而不是字节，避免切断多字节字符）
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("this is a long message", 10), "this is...");
        assert_eq!(truncate_chars("ééééééé", 5), "éé...");
    }
}
