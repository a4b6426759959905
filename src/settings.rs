//! 设置文件模块
//!
//! # 设计思路
//!
//! 设置以 JSON 文件保存（`{"api_key": "..."}`），启动时读取，用户点击“保存”时写回。
//!
//! # 实现思路
//!
//! - 文件不存在视为空配置，不报错。
//! - 读取失败 / 解析失败返回 `AppError::Config`，由调用方记录日志后按“未配置 API Key”处理。
//! - 写入先落到同目录的临时文件，再原子替换目标文件；父目录不存在时自动创建。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 默认设置文件路径（相对于工作目录）。
pub const DEFAULT_SETTINGS_PATH: &str = "settings/config.json";
/// 默认模型。
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const POLL_INTERVAL_DEFAULT_MS: u64 = 2_000;
const POLL_INTERVAL_MIN_MS: u64 = 200;
const POLL_INTERVAL_MAX_MS: u64 = 60_000;

/// 持久化设置。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

impl Settings {
    /// 当前生效的模型（未配置或为空时使用默认模型）。
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    /// 剪贴板轮询间隔，限制在合理范围内。
    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
            .unwrap_or(POLL_INTERVAL_DEFAULT_MS)
            .clamp(POLL_INTERVAL_MIN_MS, POLL_INTERVAL_MAX_MS)
    }
}

/// 设置文件读写器。
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_PATH)
    }
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取设置；文件不存在时返回默认值。
    pub fn load(&self) -> Result<Settings, AppError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| AppError::Config(format!("读取设置文件失败: {}", e)))?;
        serde_json::from_str::<Settings>(&content)
            .map_err(|e| AppError::Config(format!("解析设置文件失败: {}", e)))
    }

    /// 读取设置；任何错误都记录日志并回退默认值。
    pub fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(err) => {
                log::error!("加载配置文件失败: {}", err);
                Settings::default()
            }
        }
    }

    /// 原子写入设置文件。
    pub fn save(&self, settings: &Settings) -> Result<(), AppError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| AppError::Config(format!("创建设置目录失败: {}", e)))?;

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Config(format!("序列化设置失败: {}", e)))?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| AppError::Config(format!("创建临时设置文件失败: {}", e)))?;
        temp.write_all(content.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| AppError::Config(format!("写入设置失败: {}", e)))?;
        temp.persist(&self.path)
            .map_err(|e| AppError::Config(format!("替换设置文件失败: {}", e.error)))?;

        log::info!("配置文件已保存");
        Ok(())
    }
}
