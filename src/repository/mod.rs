// ==========================================
// 考试排考系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 访问远端排考服务（学期/考场/考试/分配），屏蔽传输细节
// 约束: 列表读取必须读尽分页
// ==========================================

pub mod error;
pub mod exam_board_repo;
pub mod memory_repo;
pub mod rest_repo;

// 重导出核心仓储
pub use error::{flatten_field_errors, FieldErrors, RepositoryError, RepositoryResult};
pub use exam_board_repo::ExamBoardRepository;
pub use memory_repo::{FailurePlan, InMemoryExamBoardRepository};
pub use rest_repo::RestExamBoardRepository;
