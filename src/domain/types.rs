// ==========================================
// 考试排考系统 - 领域类型定义
// ==========================================
// 职责: 导入字段、行状态、导入策略等枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 远端实体主键
pub type EntityId = i64;

// ==========================================
// 标准字段 (Canonical Field)
// ==========================================
// 表头解析的目标集合；序列化为 snake_case（与远端字段名一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamField {
    Title,
    CourseCode,
    Date,
    DateJalali,
    Time,
    ExamDateTime,
    DurationMinutes,
    ExpectedStudents,
    Location,
}

impl ExamField {
    pub const ALL: [ExamField; 9] = [
        ExamField::Title,
        ExamField::CourseCode,
        ExamField::Date,
        ExamField::DateJalali,
        ExamField::Time,
        ExamField::ExamDateTime,
        ExamField::DurationMinutes,
        ExamField::ExpectedStudents,
        ExamField::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExamField::Title => "title",
            ExamField::CourseCode => "course_code",
            ExamField::Date => "date",
            ExamField::DateJalali => "date_jalali",
            ExamField::Time => "time",
            ExamField::ExamDateTime => "exam_datetime",
            ExamField::DurationMinutes => "duration_minutes",
            ExamField::ExpectedStudents => "expected_students",
            ExamField::Location => "location",
        }
    }
}

impl fmt::Display for ExamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 表头语言标签
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLocale {
    Fa, // 波斯语（含阿拉伯字母变体）
    En, // 英语 / 字段名
}

// ==========================================
// 导入行状态 (Row State)
// ==========================================
// PENDING → {SKIPPED, DUPLICATE, CREATED, CREATE_FAILED}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowState {
    Pending,
    Skipped,
    Duplicate,
    Created,
    CreateFailed,
}

impl RowState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RowState::Pending)
    }
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowState::Pending => write!(f, "PENDING"),
            RowState::Skipped => write!(f, "SKIPPED"),
            RowState::Duplicate => write!(f, "DUPLICATE"),
            RowState::Created => write!(f, "CREATED"),
            RowState::CreateFailed => write!(f, "CREATE_FAILED"),
        }
    }
}

// ==========================================
// 分配跳过提示策略
// ==========================================
// Silent: 缺少房间/日期/时间时静默跳过分配（行仍计入 imported）
// Warn:   同上，但在行结果中追加提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationSkipPolicy {
    #[default]
    Silent,
    Warn,
}

impl FromStr for AllocationSkipPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(AllocationSkipPolicy::Silent),
            "warn" => Ok(AllocationSkipPolicy::Warn),
            other => Err(format!("未知的分配跳过策略: {}", other)),
        }
    }
}

// ==========================================
// 容量超限处理策略
// ==========================================
// Report:         仅报告重叠/超容，仍创建分配
// SkipAllocation: 人数超出剩余容量时不创建分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    #[default]
    Report,
    SkipAllocation,
}

impl FromStr for CapacityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(CapacityPolicy::Report),
            "skip" | "skip_allocation" => Ok(CapacityPolicy::SkipAllocation),
            other => Err(format!("未知的容量策略: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exam_field_serde_names() {
        let json = serde_json::to_string(&ExamField::DateJalali).unwrap();
        assert_eq!(json, "\"date_jalali\"");
        for field in ExamField::ALL {
            let quoted = format!("\"{}\"", field.as_str());
            assert_eq!(serde_json::to_string(&field).unwrap(), quoted);
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("warn".parse::<AllocationSkipPolicy>().unwrap(), AllocationSkipPolicy::Warn);
        assert_eq!(" Silent ".parse::<AllocationSkipPolicy>().unwrap(), AllocationSkipPolicy::Silent);
        assert_eq!("skip".parse::<CapacityPolicy>().unwrap(), CapacityPolicy::SkipAllocation);
        assert!("block".parse::<CapacityPolicy>().is_err());
    }

    #[test]
    fn test_row_state_terminal() {
        assert!(!RowState::Pending.is_terminal());
        assert!(RowState::Duplicate.is_terminal());
        assert_eq!(RowState::CreateFailed.to_string(), "CREATE_FAILED");
    }
}
