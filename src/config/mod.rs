// ==========================================
// 考试排考系统 - 配置层
// ==========================================
// 职责: 系统配置管理，支持 默认值 ← 文件 ← 环境变量 多级覆写
// ==========================================

pub mod config_manager;
pub mod error;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ApiSettings, ConfigManager};
pub use error::{ConfigError, ConfigResult};
pub use import_config_trait::ImportConfigReader;
