// ==========================================
// 考试排考系统 - 导入领域对象
// ==========================================
// 职责: 解析后的考试记录、行结果、批次汇总
// ==========================================

use crate::domain::exam::Exam;
use crate::domain::types::RowState;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ParsedExamRecord - 解析后的考试记录
// ==========================================
// 由行提取器生成；日期/时间已归一化，地点保持原文（编排阶段解析为考场 ID）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedExamRecord {
    /// Excel 行号（表头为第 1 行）
    pub row_number: usize,
    pub title: String,
    pub course_code: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub expected_students: Option<u32>,
    pub location: Option<String>,

    /// 可恢复的数据软化提示（非法片段被丢弃等）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ParsedExamRecord {
    pub fn new(row_number: usize, title: impl Into<String>) -> Self {
        Self {
            row_number,
            title: title.into(),
            course_code: None,
            date: None,
            time: None,
            duration_minutes: None,
            expected_students: None,
            location: None,
            notes: Vec::new(),
        }
    }

    /// 去除空白后的课程代码（空串视为无代码）
    pub fn trimmed_course_code(&self) -> Option<&str> {
        self.course_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

// ==========================================
// 行结果
// ==========================================

/// 行结果类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// 已创建，附带软化提示
    CreatedWithWarnings,
    /// 重复（课程代码 + 学期）
    Duplicate,
    /// 创建失败
    Failed,
    /// 跳过（标题为空）
    Skipped,
}

impl OutcomeKind {
    pub fn is_warning(&self) -> bool {
        matches!(self, OutcomeKind::CreatedWithWarnings | OutcomeKind::Duplicate)
    }

    pub fn row_state(&self) -> RowState {
        match self {
            OutcomeKind::CreatedWithWarnings => RowState::Created,
            OutcomeKind::Duplicate => RowState::Duplicate,
            OutcomeKind::Failed => RowState::CreateFailed,
            OutcomeKind::Skipped => RowState::Skipped,
        }
    }
}

/// 容量检查快照（随行结果返回）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityInfo {
    pub total: u32,
    pub used: u32,
    pub available: u32,
    pub overlapping_count: usize,
}

impl CapacityInfo {
    /// 容纳 seats 人是否不超出剩余容量
    pub fn fits(&self, seats: u32) -> bool {
        seats <= self.available
    }

    /// 超出剩余容量的人数（不超出时为 0）
    pub fn overbooked_by(&self, seats: u32) -> u32 {
        seats.saturating_sub(self.available)
    }
}

/// 单行导入结果（只记录需要展示的行：提示 / 重复 / 失败）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row_number: usize,
    /// 行标签（考试标题，缺失时为「نامشخص」）
    pub label: String,
    pub kind: OutcomeKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacityInfo>,
}

// ==========================================
// ImportSummary - 批次汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub batch_id: String,
    pub term_id: i64,
    /// 成功创建的考试数
    pub imported: usize,
    /// 硬失败行数
    pub failed: usize,
    /// 提示行数（重复 + 可恢复软化）
    pub warnings: usize,
    /// 标题为空而跳过的行数
    pub skipped: usize,
    /// 成功创建的分配数
    pub allocations_created: usize,
    pub created_exams: Vec<Exam>,
    pub row_outcomes: Vec<RowOutcome>,
    pub elapsed_ms: i64,
}

impl ImportSummary {
    pub fn new(batch_id: String, term_id: i64) -> Self {
        Self {
            batch_id,
            term_id,
            imported: 0,
            failed: 0,
            warnings: 0,
            skipped: 0,
            allocations_created: 0,
            created_exams: Vec::new(),
            row_outcomes: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// 记录一条行结果并更新计数桶
    pub fn push_outcome(&mut self, outcome: RowOutcome) {
        match outcome.kind {
            OutcomeKind::Failed => self.failed += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            kind if kind.is_warning() => self.warnings += 1,
            _ => {}
        }
        self.row_outcomes.push(outcome);
    }

    /// 记录一条创建成功的考试
    pub fn push_created(&mut self, exam: Exam) {
        self.imported += 1;
        self.created_exams.push(exam);
    }

    /// 仅取提示类结果
    pub fn warning_outcomes(&self) -> impl Iterator<Item = &RowOutcome> {
        self.row_outcomes.iter().filter(|o| o.kind.is_warning())
    }
}
