// ==========================================
// 考试排考系统 - 核心库
// ==========================================
// 职责: 考场分配冲突/容量引擎 + 表格批量导入流水线
// 技术栈: Rust + tokio + reqwest（远端排考服务）
// 系统定位: 持久化由远端服务负责，本库不持有数据库
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 远端排考服务
pub mod repository;

// 引擎层 - 重叠/容量/报表
pub mod engine;

// 导入层 - 表格导入与导出
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    Allocation, CapacityInfo, Exam, ImportSummary, OutcomeKind, ParsedExamRecord, Room,
    RowOutcome, Term,
};

// 引擎
pub use engine::{BookingLedger, Interval, RoomDirectory, ScheduleView};

// 导入
pub use importer::{ExamBatchImporter, ExamImporter};

// API
pub use api::{ApiError, ApiResult, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "考试排考系统";
