//! MADmin HTTP 数据源
//!
//! `GET {url}/get_game_stats_shiny?from=<unix>&to=<unix>`，可选 basic auth。

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{EventSource, PollWindow};
use crate::error::SourceError;
use crate::event::{ShinyEvent, ShinyKey};

/// 错误信息中保留的原始响应长度
const BODY_EXCERPT_LEN: usize = 200;

/// MADmin 连接配置
#[derive(Debug, Clone)]
pub struct MadminConfig {
    /// MADmin 根地址（如 http://madmin.local:5000）
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    /// 文本时间戳（`%Y-%m-%d %H:%M:%S`）所在的时区，与摘要显示时区一致
    pub local_offset: FixedOffset,
}

impl MadminConfig {
    /// 用户名和密码都非空时才启用 basic auth
    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// MADmin HTTP 数据源
#[derive(Debug)]
pub struct MadminSource {
    client: Client,
    config: MadminConfig,
}

impl MadminSource {
    pub fn new(config: MadminConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/get_game_stats_shiny",
            self.config.url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl EventSource for MadminSource {
    fn name(&self) -> &str {
        "madmin"
    }

    async fn fetch(&self, window: PollWindow) -> Result<Vec<ShinyEvent>, SourceError> {
        let mut request = self
            .client
            .get(self.endpoint())
            .query(&[("from", window.from_ts()), ("to", window.to_ts())]);

        if let Some((user, pass)) = self.config.credentials() {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::unavailable(window, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::unavailable(window, e))?;

        if !status.is_success() {
            return Err(SourceError::unavailable(
                window,
                format!("HTTP {}: {}", status, excerpt(&body)),
            ));
        }

        debug!(window = %window, bytes = body.len(), "MADmin response received");
        parse_response(&body, window, self.config.local_offset)
    }
}

/// 解析 `get_game_stats_shiny` 响应
///
/// 整体不是合法 JSON 时返回 `Malformed`；单条记录无效只跳过该条。
pub fn parse_response(
    body: &str,
    window: PollWindow,
    local_offset: FixedOffset,
) -> Result<Vec<ShinyEvent>, SourceError> {
    let response: ShinyStatsResponse = serde_json::from_str(body).map_err(|e| {
        SourceError::malformed(window, format!("{} (body: {})", e, excerpt(body)))
    })?;

    if response.empty {
        return Ok(Vec::new());
    }

    let mut events = Vec::with_capacity(response.shiny_statistics.len());
    for entry in response.shiny_statistics {
        let parsed = serde_json::from_value::<MadminShiny>(entry.clone())
            .map_err(|e| e.to_string())
            .and_then(|shiny| shiny.into_event(local_offset));

        match parsed {
            Ok(event) => events.push(event),
            Err(reason) => {
                let raw = entry.to_string();
                warn!(
                    window = %window,
                    reason = %reason,
                    entry = %excerpt(&raw),
                    "Skipping malformed shiny entry"
                );
            }
        }
    }
    Ok(events)
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[derive(Debug, Deserialize)]
struct ShinyStatsResponse {
    #[serde(default)]
    empty: bool,
    #[serde(default)]
    shiny_statistics: Vec<serde_json::Value>,
}

/// MADmin 的数字字段有时是字符串（如 `lat_5` 是格式化后的文本）
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Loose {
    fn as_text(&self) -> String {
        match self {
            Loose::Int(n) => n.to_string(),
            Loose::UInt(n) => n.to_string(),
            Loose::Float(f) => f.to_string(),
            Loose::Text(s) => s.clone(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Int(n) => Some(*n as f64),
            Loose::UInt(n) => Some(*n as f64),
            Loose::Float(f) => Some(*f),
            Loose::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            Loose::Int(n) => u32::try_from(*n).ok(),
            Loose::UInt(n) => u32::try_from(*n).ok(),
            Loose::Float(_) => None,
            Loose::Text(s) => s.trim().parse().ok(),
        }
    }

    /// unix 秒，或 MADmin 服务器本地时间的文本
    fn as_datetime(&self, local_offset: FixedOffset) -> Option<DateTime<Utc>> {
        match self {
            Loose::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
            Loose::UInt(secs) => Utc.timestamp_opt(i64::try_from(*secs).ok()?, 0).single(),
            Loose::Float(secs) => Utc.timestamp_opt(*secs as i64, 0).single(),
            Loose::Text(s) => {
                let s = s.trim();
                if let Ok(secs) = s.parse::<i64>() {
                    return Utc.timestamp_opt(secs, 0).single();
                }
                let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?;
                local_offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|t| t.with_timezone(&Utc))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MadminShiny {
    encounter_id: Loose,
    #[serde(alias = "pokemon_id")]
    mon_id: Loose,
    #[serde(default)]
    form: Option<Loose>,
    name: String,
    timestamp: Loose,
    #[serde(default)]
    disappear_time: Option<Loose>,
    #[serde(default)]
    worker: String,
    #[serde(alias = "lat")]
    lat_5: Loose,
    #[serde(alias = "lng")]
    lng_5: Loose,
    #[serde(default)]
    img: Option<String>,
}

impl MadminShiny {
    fn into_event(self, local_offset: FixedOffset) -> Result<ShinyEvent, String> {
        let field = |name: &str| format!("invalid field `{}`", name);

        let pokemon_id = self.mon_id.as_u32().ok_or_else(|| field("mon_id"))?;
        let form = match &self.form {
            Some(form) => form.as_u32().ok_or_else(|| field("form"))?,
            None => 0,
        };
        let detected_at = self
            .timestamp
            .as_datetime(local_offset)
            .ok_or_else(|| field("timestamp"))?;
        let expires_at = match &self.disappear_time {
            Some(t) => Some(t.as_datetime(local_offset).ok_or_else(|| field("disappear_time"))?),
            None => None,
        };
        let latitude = self.lat_5.as_f64().ok_or_else(|| field("lat_5"))?;
        let longitude = self.lng_5.as_f64().ok_or_else(|| field("lng_5"))?;

        Ok(ShinyEvent {
            key: ShinyKey {
                encounter_id: self.encounter_id.as_text(),
                pokemon_id,
                form,
            },
            name: self.name,
            detected_at,
            expires_at,
            worker: self.worker,
            latitude,
            longitude,
            image: self.img.filter(|img| !img.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    fn window() -> PollWindow {
        PollWindow::new(
            Utc.timestamp_opt(1_714_566_000, 0).unwrap(),
            Utc.timestamp_opt(1_714_566_060, 0).unwrap(),
        )
    }

    #[test]
    fn test_empty_response_yields_no_events() {
        let events = parse_response(r#"{"empty": true}"#, window(), utc()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_shiny_statistics() {
        let body = r#"{
            "shiny_statistics": [
                {
                    "encounter_id": "8412331598765432101",
                    "mon_id": 129,
                    "form": 0,
                    "name": "Magikarp",
                    "timestamp": "2024-05-01 12:30:15",
                    "worker": "atv-03",
                    "lat_5": "45.12345",
                    "lng_5": "3.45678",
                    "img": "asset/pokemon_icons/pokemon_icon_129_00.png"
                },
                {
                    "encounter_id": 42,
                    "mon_id": "25",
                    "name": "Pikachu",
                    "timestamp": 1714566030,
                    "disappear_time": 1714567000,
                    "worker": "atv-04",
                    "lat": 46.5,
                    "lng": 4.25
                }
            ]
        }"#;

        let events = parse_response(body, window(), utc()).unwrap();
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].key.encounter_id, "8412331598765432101");
        assert_eq!(events[0].key.pokemon_id, 129);
        assert_eq!(events[0].name, "Magikarp");
        assert_eq!(events[0].detected_at.timestamp(), 1_714_566_615);
        assert!(events[0].expires_at.is_none());
        assert_eq!(events[0].latitude, 45.12345);

        assert_eq!(events[1].key.encounter_id, "42");
        assert_eq!(events[1].key.form, 0);
        assert_eq!(events[1].expires_at.unwrap().timestamp(), 1_714_567_000);
        assert!(events[1].image.is_none());
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = parse_response("<html>502 Bad Gateway</html>", window(), utc()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
        assert!(err.to_string().contains("502 Bad Gateway"));
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let body = r#"{"shiny_statistics": [
            {"encounter_id": 1, "mon_id": 1, "name": "Bulbasaur",
             "timestamp": 1714566030, "worker": "w", "lat_5": "north", "lng_5": "1.0"},
            {"encounter_id": 2, "name": "Missing mon_id", "timestamp": 1714566030,
             "worker": "w", "lat_5": 1.0, "lng_5": 1.0},
            {"encounter_id": 3, "mon_id": 4, "name": "Charmander",
             "timestamp": 1714566040, "worker": "w", "lat_5": "45.0", "lng_5": "3.0"}
        ]}"#;
        let events = parse_response(body, window(), utc()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Charmander");
    }

    #[test]
    fn test_text_timestamp_read_in_local_offset() {
        let body = r#"{"shiny_statistics": [{
            "encounter_id": 1, "mon_id": 129, "name": "Magikarp",
            "timestamp": "2024-05-01 12:30:15", "disappear_time": 1714567000,
            "worker": "w", "lat_5": "45.0", "lng_5": "3.0"
        }]}"#;
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let events = parse_response(body, window(), plus_two).unwrap();

        // 12:30:15 (+02:00) = 10:30:15 UTC
        assert_eq!(events[0].detected_at.timestamp(), 1_714_566_615 - 2 * 3600);
        // unix 秒不受时区影响
        assert_eq!(events[0].expires_at.unwrap().timestamp(), 1_714_567_000);
    }

    #[test]
    fn test_credentials_require_both_values() {
        let mut config = MadminConfig {
            url: "http://madmin".to_string(),
            username: Some("admin".to_string()),
            password: Some(String::new()),
            timeout_secs: 5,
            local_offset: utc(),
        };
        assert!(config.credentials().is_none());

        config.password = Some("secret".to_string());
        assert_eq!(config.credentials(), Some(("admin", "secret")));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let source = MadminSource::new(MadminConfig {
            url: "http://madmin:5000/".to_string(),
            username: None,
            password: None,
            timeout_secs: 5,
            local_offset: utc(),
        })
        .unwrap();
        assert_eq!(source.endpoint(), "http://madmin:5000/get_game_stats_shiny");
    }
}
