// ==========================================
// 考试排考系统 - 领域模型层
// ==========================================
// 职责: 定义排考实体、导入记录与枚举类型
// 红线: 不含远端访问逻辑,不含引擎逻辑
// ==========================================

pub mod exam;
pub mod import;
pub mod types;

// 重导出核心类型
pub use exam::{
    active_terms, Allocation, CreateAllocationPayload, CreateExamPayload, Exam, LegacyPlacement,
    Room, Term, UpdateAllocationPayload, DEFAULT_DURATION_MINUTES,
};
pub use import::{CapacityInfo, ImportSummary, OutcomeKind, ParsedExamRecord, RowOutcome};
pub use types::{
    AllocationSkipPolicy, CapacityPolicy, EntityId, ExamField, HeaderLocale, RowState,
};
