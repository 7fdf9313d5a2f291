//! 闪光遭遇事件

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 事件身份：遭遇 ID + 种类 + 形态
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShinyKey {
    pub encounter_id: String,
    pub pokemon_id: u32,
    pub form: u32,
}

impl fmt::Display for ShinyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.encounter_id, self.pokemon_id, self.form)
    }
}

/// 一次闪光遭遇（从数据源获取后不再修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShinyEvent {
    pub key: ShinyKey,
    /// 显示名称
    pub name: String,
    /// 检测时间
    pub detected_at: DateTime<Utc>,
    /// 消失时间
    pub expires_at: Option<DateTime<Utc>>,
    /// 上报的 worker
    pub worker: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 图片（绝对 URL，或相对 MADmin 根地址的路径）
    pub image: Option<String>,
}

impl ShinyEvent {
    pub fn key(&self) -> &ShinyKey {
        &self.key
    }
}

#[cfg(test)]
pub(crate) fn sample_event(encounter_id: &str, name: &str) -> ShinyEvent {
    use chrono::TimeZone;

    ShinyEvent {
        key: ShinyKey {
            encounter_id: encounter_id.to_string(),
            pokemon_id: 1,
            form: 0,
        },
        name: name.to_string(),
        detected_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap(),
        expires_at: None,
        worker: "worker-1".to_string(),
        latitude: 45.12345,
        longitude: 3.456781,
        image: Some("asset/pokemon_icons/pokemon_icon_001_00.png".to_string()),
    }
}
