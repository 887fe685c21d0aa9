// ==========================================
// 考试排考系统 - 配置层错误类型
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件读取失败 ({path}): {message}")]
    FileRead { path: String, message: String },

    #[error("配置文件格式错误 ({path}): {message}")]
    FileParse { path: String, message: String },

    #[error("配置值无效 (key={key}): {value}")]
    InvalidValue { key: String, value: String },

    #[error("未知配置键: {0}")]
    UnknownKey(String),

    #[error("锁获取失败: {0}")]
    LockError(String),
}

/// Result 类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
