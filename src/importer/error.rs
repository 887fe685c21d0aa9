// ==========================================
// 考试排考系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 错误文本面向最终用户（波斯语），日志使用中文
// ==========================================

use crate::config::error::ConfigError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型（整批失败的结构性错误）
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("فایل یافت نشد: {0}")]
    FileNotFound(String),

    #[error("فقط فایل‌های Excel (.xlsx, .xls, .ods) یا CSV پشتیبانی می‌شوند: {0}")]
    UnsupportedFormat(String),

    #[error("خطا در خواندن فایل: {0}")]
    FileReadError(String),

    #[error("فایل Excel خالی است یا فرمت نامعتبر دارد: {0}")]
    ExcelParseError(String),

    #[error("خطا در پردازش فایل CSV: {0}")]
    CsvParseError(String),

    #[error("خطا در نوشتن فایل خروجی: {0}")]
    ExportWriteError(String),

    // ===== 结构性错误 =====
    #[error("فایل Excel باید حداقل یک ردیف داده داشته باشد")]
    EmptySheet,

    #[error("ستون \"عنوان\" یا \"title\" یافت نشد. ستون‌های موجود: {available}")]
    MissingTitleColumn { available: String },

    #[error("هیچ داده‌ای در فایل Excel یافت نشد")]
    NoDataRows,

    // ===== 远端错误 =====
    #[error("خطا در ارتباط با سرور: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("خطای پیکربندی: {0}")]
    Config(#[from] ConfigError),

    // ===== 通用错误 =====
    #[error("خطای داخلی: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ImportError::FileNotFound(err.to_string()),
            _ => ImportError::FileReadError(err.to_string()),
        }
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<rust_xlsxwriter::XlsxError>
impl From<rust_xlsxwriter::XlsxError> for ImportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ImportError::ExportWriteError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
