// ==========================================
// 考试排考系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 分层: 内置默认值 ← JSON 配置文件 ← 环境变量 (EXAM_BOARD_*)
// 文件: dirs::config_dir()/exam-board/config.json（可显式指定）
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::import_config_trait::ImportConfigReader;
use crate::domain::exam::{DEFAULT_DURATION_MINUTES, MAX_DURATION_MINUTES};
use crate::domain::types::{AllocationSkipPolicy, CapacityPolicy, EntityId};
use crate::engine::reporting::ReportSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "EXAM_BOARD_";

/// 远端服务连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: Option<String>,
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Debug)]
pub struct ConfigManager {
    values: RwLock<HashMap<String, String>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// 仅含内置默认值的配置
    pub fn new() -> Self {
        let values = config_keys::DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// 默认配置文件路径
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("exam-board").join("config.json"))
    }

    /// 加载配置文件并叠加环境变量
    ///
    /// # 参数
    /// - path: 配置文件路径；None 时使用默认路径（文件不存在则跳过）
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let manager = Self::new();

        let explicit = path.is_some();
        let path = path.map(Path::to_path_buf).or_else(Self::default_config_path);
        if let Some(path) = path {
            if path.exists() {
                manager.merge_file(&path)?;
            } else if explicit {
                return Err(ConfigError::FileRead {
                    path: path.display().to_string(),
                    message: "文件不存在".to_string(),
                });
            } else {
                debug!(path = %path.display(), "默认配置文件不存在，使用内置默认值");
            }
        }

        manager.merge_env(std::env::vars())?;
        Ok(manager)
    }

    /// 合并 JSON 配置文件（嵌套对象展开为点分键）
    pub fn merge_file(&self, path: &Path) -> ConfigResult<usize> {
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: shown.clone(),
            message: e.to_string(),
        })?;
        let count = self.merge_json(&raw).map_err(|e| match e {
            ConfigError::FileParse { message, .. } => ConfigError::FileParse {
                path: shown.clone(),
                message,
            },
            other => other,
        })?;
        info!(path = %shown, count, "已加载配置文件");
        Ok(count)
    }

    /// 合并 JSON 文本
    pub fn merge_json(&self, raw: &str) -> ConfigResult<usize> {
        let root: Value = serde_json::from_str(raw).map_err(|e| ConfigError::FileParse {
            path: String::new(),
            message: e.to_string(),
        })?;
        let mut flat = BTreeMap::new();
        flatten_json("", &root, &mut flat);

        let mut count = 0;
        for (key, value) in flat {
            if !config_keys::is_known(&key) {
                warn!(config_key = %key, "忽略未知配置键");
                continue;
            }
            self.set(&key, value)?;
            count += 1;
        }
        Ok(count)
    }

    /// 合并环境变量（`api.base_url` ↔ `EXAM_BOARD_API_BASE_URL`）
    pub fn merge_env<I>(&self, vars: I) -> ConfigResult<usize>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: HashMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        let mut count = 0;
        for key in config_keys::ALL {
            if let Some(value) = env.get(&config_keys::env_name(key)) {
                self.set(key, value.clone())?;
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, "已应用环境变量覆写");
        }
        Ok(count)
    }

    /// 覆写单个配置项
    pub fn set(&self, key: &str, value: impl Into<String>) -> ConfigResult<()> {
        if !config_keys::is_known(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        let mut values = self
            .values
            .write()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        values.insert(key.to_string(), value.into());
        Ok(())
    }

    /// 链式覆写（测试与 CLI 参数使用）
    pub fn with_override(self, key: &str, value: impl Into<String>) -> ConfigResult<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// 读取配置值
    pub fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    fn get_parsed_or<T: FromStr>(&self, key: &str, default: T) -> ConfigResult<T> {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(config_key = key, raw_value = %raw, "配置值格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON 格式，令牌打码）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let values = self
            .values
            .read()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        let snapshot: BTreeMap<&str, &str> = values
            .iter()
            .map(|(k, v)| {
                let shown = if k == config_keys::API_TOKEN && !v.is_empty() {
                    "***"
                } else {
                    v.as_str()
                };
                (k.as_str(), shown)
            })
            .collect();
        serde_json::to_string(&snapshot).map_err(|e| ConfigError::InvalidValue {
            key: "snapshot".to_string(),
            value: e.to_string(),
        })
    }

    // ===== 分组读取 =====

    /// 远端服务连接配置
    pub fn api_settings(&self) -> ConfigResult<ApiSettings> {
        let base_url = self.get_config_or_default(config_keys::API_BASE_URL, "http://localhost:8000")?;
        let token = self
            .get_config_value(config_keys::API_TOKEN)?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(ApiSettings { base_url, token })
    }

    /// 利用率报表参数
    pub fn report_settings(&self) -> ConfigResult<ReportSettings> {
        let defaults = ReportSettings::default();
        Ok(ReportSettings {
            working_days: self.get_parsed_or(config_keys::REPORT_WORKING_DAYS, defaults.working_days)?,
            hours_per_day: self
                .get_parsed_or(config_keys::REPORT_HOURS_PER_DAY, defaults.hours_per_day)?,
        })
    }
}

/// 展开嵌套 JSON 为点分键
fn flatten_json(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten_json(&key, v, out);
            }
        }
        Value::Null => {
            out.insert(prefix.to_string(), "none".to_string());
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_default_duration_minutes(&self) -> ConfigResult<u32> {
        let value = self.get_parsed_or(config_keys::IMPORT_DEFAULT_DURATION_MINUTES, DEFAULT_DURATION_MINUTES)?;
        if value == 0 || value > MAX_DURATION_MINUTES {
            warn!(value, "默认考试时长超出范围，使用内置默认值");
            return Ok(DEFAULT_DURATION_MINUTES);
        }
        Ok(value)
    }

    async fn get_default_expected_students(&self) -> ConfigResult<Option<u32>> {
        let value = self.get_config_or_default(config_keys::IMPORT_DEFAULT_EXPECTED_STUDENTS, "1")?;
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "null" => Ok(None),
            other => Ok(Some(other.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or(1))),
        }
    }

    async fn get_owner_id(&self) -> ConfigResult<EntityId> {
        self.get_parsed_or(config_keys::IMPORT_OWNER_ID, 1)
    }

    async fn get_allocation_skip_policy(&self) -> ConfigResult<AllocationSkipPolicy> {
        self.get_parsed_or(
            config_keys::IMPORT_ALLOCATION_SKIP_POLICY,
            AllocationSkipPolicy::default(),
        )
    }

    async fn get_capacity_policy(&self) -> ConfigResult<CapacityPolicy> {
        self.get_parsed_or(config_keys::IMPORT_CAPACITY_POLICY, CapacityPolicy::default())
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 远端服务
    pub const API_BASE_URL: &str = "api.base_url";
    pub const API_TOKEN: &str = "api.token";

    // 导入
    pub const IMPORT_DEFAULT_DURATION_MINUTES: &str = "import.default_duration_minutes";
    pub const IMPORT_DEFAULT_EXPECTED_STUDENTS: &str = "import.default_expected_students";
    pub const IMPORT_OWNER_ID: &str = "import.owner_id";
    pub const IMPORT_ALLOCATION_SKIP_POLICY: &str = "import.allocation_skip_policy";
    pub const IMPORT_CAPACITY_POLICY: &str = "import.capacity_policy";

    // 报表
    pub const REPORT_WORKING_DAYS: &str = "report.working_days";
    pub const REPORT_HOURS_PER_DAY: &str = "report.hours_per_day";

    pub const ALL: [&str; 9] = [
        API_BASE_URL,
        API_TOKEN,
        IMPORT_DEFAULT_DURATION_MINUTES,
        IMPORT_DEFAULT_EXPECTED_STUDENTS,
        IMPORT_OWNER_ID,
        IMPORT_ALLOCATION_SKIP_POLICY,
        IMPORT_CAPACITY_POLICY,
        REPORT_WORKING_DAYS,
        REPORT_HOURS_PER_DAY,
    ];

    /// 内置默认值
    pub const DEFAULTS: [(&str, &str); 8] = [
        (API_BASE_URL, "http://localhost:8000"),
        (IMPORT_DEFAULT_DURATION_MINUTES, "120"),
        (IMPORT_DEFAULT_EXPECTED_STUDENTS, "1"),
        (IMPORT_OWNER_ID, "1"),
        (IMPORT_ALLOCATION_SKIP_POLICY, "silent"),
        (IMPORT_CAPACITY_POLICY, "report"),
        (REPORT_WORKING_DAYS, "80"),
        (REPORT_HOURS_PER_DAY, "10"),
    ];

    pub fn is_known(key: &str) -> bool {
        ALL.contains(&key)
    }

    /// 配置键对应的环境变量名
    pub fn env_name(key: &str) -> String {
        format!("{}{}", super::ENV_PREFIX, key.replace('.', "_").to_uppercase())
    }
}
