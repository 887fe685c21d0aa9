// ==========================================
// 考试排考系统 - 引擎层
// ==========================================
// 职责: 时间区间重叠、考场容量、冲突分组与报表
// 红线: Engine 不访问远端服务，只处理已取回的数据
// ==========================================

pub mod conflict;
pub mod events;
pub mod reporting;
pub mod schedule;

// 重导出核心引擎
pub use conflict::{conflict_groups, overlaps, Booking, BookingLedger, ConflictGroup, Interval};
pub use events::{
    CollectingEventSink, ImportEvent, ImportEventSink, NoOpEventSink, OptionalEventSink,
};
pub use reporting::{
    capacity_report, conflict_report, utilization_report, CapacityRow, ConflictEntry,
    ConflictReportGroup, ReportSettings, RoomUtilization,
};
pub use schedule::{
    allocation_ledger, resolve_placement, Placement, PlacementSource, RoomDirectory, RoomRef,
    ScheduleView,
};
