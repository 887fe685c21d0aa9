// ==========================================
// 考试排考系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将导入/远端/配置错误转换为用户可读的消息
// ==========================================

use crate::config::error::ConfigError;
use crate::importer::error::ImportError;
use crate::repository::error::{flatten_field_errors, RepositoryError};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("ورودی نامعتبر: {0}")]
    InvalidInput(String),

    #[error("یافت نشد: {0}")]
    NotFound(String),

    /// 改期目标与其他考试重叠或超出考场容量，且调用方未接受冲突
    #[error("تداخل زمانی در سالن {room_id}: {overlapping_count} امتحان هم‌زمان، ظرفیت باقی‌مانده {available} از {total}")]
    ScheduleConflict {
        room_id: i64,
        overlapping_count: usize,
        available: u32,
        total: u32,
    },

    // ==========================================
    // 导入错误
    // ==========================================
    /// 结构性错误：整批失败
    #[error("{0}")]
    ImportError(String),

    #[error("داده نامعتبر: {0}")]
    ValidationError(String),

    // ==========================================
    // 远端服务错误
    // ==========================================
    #[error("خطا در ارتباط با سرور: {0}")]
    RemoteError(String),

    // ==========================================
    // 配置错误
    // ==========================================
    #[error("خطای پیکربندی: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("خطای داخلی: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} (id={})", entity, id))
            }
            RepositoryError::Validation(fields) => {
                ApiError::ValidationError(flatten_field_errors(&fields))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
            other => ApiError::RemoteError(other.user_message()),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(e) => ApiError::from(e),
            ImportError::Config(e) => ApiError::from(e),
            ImportError::InternalError(msg) => ApiError::InternalError(msg),
            ImportError::Other(e) => ApiError::Other(e),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

// 实现 From<ConfigError>
impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
