//! MAD MySQL 数据源
//!
//! 连接在第一次查询时建立，之后复用同一个连接池。
//! 查询使用运行时参数绑定（不需要在编译期连接数据库）。

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{EventSource, PollWindow};
use crate::error::SourceError;
use crate::event::{ShinyEvent, ShinyKey};
use crate::locale::NameTable;

/// 单进程只跑一个轮询任务，不需要大连接池
const MAX_CONNECTIONS: u32 = 2;

const SHINY_QUERY: &str = r#"
SELECT CAST(t.encounter_id AS CHAR) AS encounter_id,
       CAST(p.pokemon_id AS SIGNED) AS pokemon_id,
       CAST(COALESCE(p.form, 0) AS SIGNED) AS form,
       p.latitude AS latitude,
       p.longitude AS longitude,
       CAST(UNIX_TIMESTAMP(p.disappear_time) AS SIGNED) AS disappear_ts,
       CAST(t.timestamp_scan AS SIGNED) AS detected_ts,
       t.worker AS worker
FROM trs_stats_detect_mon_raw t
JOIN pokemon p ON p.encounter_id = t.encounter_id
WHERE t.is_shiny = 1
  AND t.timestamp_scan >= ?
  AND t.timestamp_scan < ?
ORDER BY t.timestamp_scan
"#;

/// 数据库连接配置
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// 图标根地址，用于生成 `pokemon_icon_025_00.png` 形式的图片 URL
    pub icon_base_url: Option<String>,
    pub timeout_secs: u64,
}

/// 查询结果的一行（解码后）
#[derive(Debug, Clone, PartialEq)]
pub struct ShinyRow {
    pub encounter_id: String,
    pub pokemon_id: i64,
    pub form: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub disappear_ts: Option<i64>,
    pub detected_ts: i64,
    pub worker: String,
}

impl ShinyRow {
    fn decode(row: &MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            encounter_id: row.try_get("encounter_id")?,
            pokemon_id: row.try_get("pokemon_id")?,
            form: row.try_get("form")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            disappear_ts: row.try_get("disappear_ts")?,
            detected_ts: row.try_get("detected_ts")?,
            worker: row.try_get("worker")?,
        })
    }

    /// 转换为事件，名称和图片在这里补全
    pub fn into_event(
        self,
        names: &NameTable,
        icon_base_url: Option<&str>,
    ) -> Result<ShinyEvent, String> {
        let pokemon_id = u32::try_from(self.pokemon_id)
            .map_err(|_| format!("invalid pokemon_id {}", self.pokemon_id))?;
        let form =
            u32::try_from(self.form).map_err(|_| format!("invalid form {}", self.form))?;
        let detected_at = Utc
            .timestamp_opt(self.detected_ts, 0)
            .single()
            .ok_or_else(|| format!("invalid timestamp_scan {}", self.detected_ts))?;
        let expires_at = self
            .disappear_ts
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        let image = icon_base_url
            .filter(|base| !base.is_empty())
            .map(|base| icon_url(base, pokemon_id, form));

        Ok(ShinyEvent {
            name: names.display_name(pokemon_id, form),
            key: ShinyKey {
                encounter_id: self.encounter_id,
                pokemon_id,
                form,
            },
            detected_at,
            expires_at,
            worker: self.worker,
            latitude: self.latitude,
            longitude: self.longitude,
            image,
        })
    }
}

fn icon_url(base: &str, pokemon_id: u32, form: u32) -> String {
    format!(
        "{}/pokemon_icon_{:03}_{:02}.png",
        base.trim_end_matches('/'),
        pokemon_id,
        form
    )
}

/// MySQL 数据源
pub struct DatabaseSource {
    config: DatabaseConfig,
    names: NameTable,
    pool: OnceCell<MySqlPool>,
}

impl DatabaseSource {
    pub fn new(config: DatabaseConfig, names: NameTable) -> Self {
        Self {
            config,
            names,
            pool: OnceCell::new(),
        }
    }

    /// 获取连接池（第一次调用时建立连接）
    async fn pool(&self) -> Result<&MySqlPool, sqlx::Error> {
        self.pool
            .get_or_try_init(|| async {
                let options = MySqlConnectOptions::new()
                    .host(&self.config.host)
                    .port(self.config.port)
                    .username(&self.config.user)
                    .password(&self.config.password)
                    .database(&self.config.database);

                let pool = MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(Duration::from_secs(self.config.timeout_secs))
                    .connect_with(options)
                    .await?;

                info!(
                    host = %self.config.host,
                    database = %self.config.database,
                    "Connected to MAD database"
                );
                Ok::<_, sqlx::Error>(pool)
            })
            .await
    }
}

#[async_trait]
impl EventSource for DatabaseSource {
    fn name(&self) -> &str {
        "database"
    }

    async fn fetch(&self, window: PollWindow) -> Result<Vec<ShinyEvent>, SourceError> {
        let pool = self
            .pool()
            .await
            .map_err(|e| SourceError::unavailable(window, e))?;

        let rows = sqlx::query(SHINY_QUERY)
            .bind(window.from_ts())
            .bind(window.to_ts())
            .fetch_all(pool)
            .await
            .map_err(|e| SourceError::unavailable(window, e))?;

        debug!(window = %window, rows = rows.len(), "Shiny query finished");

        // 单行无效只跳过该行，不影响同一窗口里的其他事件
        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let parsed = ShinyRow::decode(row)
                .map_err(|e| e.to_string())
                .and_then(|raw| raw.into_event(&self.names, self.config.icon_base_url.as_deref()));

            match parsed {
                Ok(event) => events.push(event),
                Err(reason) => warn!(window = %window, reason = %reason, "Skipping malformed shiny row"),
            }
        }
        Ok(events)
    }
}
