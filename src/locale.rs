//! 本地化 - 摘要文案和宝可梦名称

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::ConfigError;

/// 支持的语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    De,
    Fr,
}

/// 摘要中使用的连接词
#[derive(Debug, Clone, Copy)]
pub struct Phrases {
    pub header: &'static str,
    pub at: &'static str,
    pub until: &'static str,
    pub by: &'static str,
}

impl Locale {
    pub fn phrases(&self) -> Phrases {
        match self {
            Locale::En => Phrases {
                header: "Encountered shinies:",
                at: "at",
                until: "until",
                by: "by",
            },
            Locale::De => Phrases {
                header: "Gefundene Shinys:",
                at: "um",
                until: "bis",
                by: "von",
            },
            Locale::Fr => Phrases {
                header: "Shinys rencontrés :",
                at: "à",
                until: "jusqu'à",
                by: "par",
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::De => "de",
            Locale::Fr => "fr",
        }
    }
}

impl FromStr for Locale {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "en" => Ok(Locale::En),
            "de" => Ok(Locale::De),
            "fr" => Ok(Locale::Fr),
            other => Err(ConfigError::UnsupportedLocale(other.to_string())),
        }
    }
}

/// 宝可梦名称表（id -> 本地化名称）
///
/// 数据库后端只返回 id，需要在这里查名称。
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<u32, String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 文件加载：`{"1": "Bulbasaur", "4": "Charmander"}`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read names file {}", path.display()))?;
        let raw: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse names file {}", path.display()))?;

        let names = raw
            .into_iter()
            .filter_map(|(id, name)| id.trim().parse::<u32>().ok().map(|id| (id, name)))
            .collect::<HashMap<_, _>>();

        debug!(path = %path.display(), count = names.len(), "Loaded pokemon names");
        Ok(Self { names })
    }

    pub fn insert(&mut self, id: u32, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 查找显示名称；未知 id 显示为 `#025`，非默认形态追加 `(form N)`
    pub fn display_name(&self, pokemon_id: u32, form: u32) -> String {
        let base = self
            .names
            .get(&pokemon_id)
            .cloned()
            .unwrap_or_else(|| format!("#{:03}", pokemon_id));

        if form == 0 {
            base
        } else {
            format!("{} (form {})", base, form)
        }
    }
}
