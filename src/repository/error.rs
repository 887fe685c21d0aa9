// ==========================================
// 考试排考系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 远端排考服务的 HTTP / 校验 / 传输 / 解码错误
// ==========================================

use std::collections::BTreeMap;
use thiserror::Error;

/// 字段级校验错误（字段名 → 错误消息列表）
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 远端响应错误 =====
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{}", flatten_field_errors(.0))]
    Validation(FieldErrors),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    // ===== 传输与解码错误 =====
    #[error("请求发送失败: {0}")]
    Transport(String),

    #[error("响应解析失败: {0}")]
    Decode(String),

    #[error("分页游标重复: {0}")]
    PaginationLoop(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    /// 是否为「课程代码 + 学期 唯一」约束冲突
    ///
    /// 远端对重复考试返回的校验消息同时提及 course_code 与 term，并带有唯一性措辞
    pub fn is_duplicate_violation(&self) -> bool {
        let text = match self {
            RepositoryError::Validation(fields) => flatten_field_errors(fields),
            RepositoryError::Http { body, .. } => body.clone(),
            _ => return false,
        };
        let lower = text.to_lowercase();
        let names_key = lower.contains("course_code") && lower.contains("term");
        let unique = ["unique", "duplicate", "already exists", "یکتا", "تکراری"]
            .iter()
            .any(|word| lower.contains(word));
        names_key && unique
    }

    /// 面向用户的错误消息
    pub fn user_message(&self) -> String {
        match self {
            RepositoryError::Validation(fields) => flatten_field_errors(fields),
            RepositoryError::Http { body, .. } if !body.trim().is_empty() => body.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// 扁平化字段错误: `field: a, b | field2: c`
pub fn flatten_field_errors(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join(" | ")
}

// 实现 From<reqwest::Error>
impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RepositoryError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RepositoryError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            RepositoryError::Transport(err.to_string())
        }
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Decode(err.to_string())
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(items: &[(&str, &[&str])]) -> FieldErrors {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_flatten_field_errors() {
        let errors = fields(&[("title", &["required", "too short"]), ("term", &["invalid"])]);
        assert_eq!(flatten_field_errors(&errors), "term: invalid | title: required, too short");
    }

    #[test]
    fn test_duplicate_violation_detection() {
        let dup = RepositoryError::Validation(fields(&[(
            "non_field_errors",
            &["The fields course_code, term must make a unique set."],
        )]));
        assert!(dup.is_duplicate_violation());

        let persian = RepositoryError::Http {
            status: 400,
            body: "ترکیب course_code و term باید یکتا باشد".to_string(),
        };
        assert!(persian.is_duplicate_violation());

        let other = RepositoryError::Validation(fields(&[("title", &["required"])]));
        assert!(!other.is_duplicate_violation());
        assert!(!RepositoryError::Transport("x".to_string()).is_duplicate_violation());
    }

    #[test]
    fn test_user_message_prefers_body() {
        let err = RepositoryError::Http {
            status: 500,
            body: " boom ".to_string(),
        };
        assert_eq!(err.user_message(), "boom");
        let err = RepositoryError::Http {
            status: 502,
            body: String::new(),
        };
        assert_eq!(err.user_message(), "HTTP 502: ");
    }
}
