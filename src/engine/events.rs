// ==========================================
// 考试排考系统 - 导入事件发布
// ==========================================
// 职责: 定义导入事件及事件接收 trait，实现依赖倒置
// 说明: Importer 只依赖 ImportEventSink，调用方决定事件去向
// ==========================================

use crate::domain::import::CapacityInfo;
use crate::domain::types::EntityId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

// ==========================================
// 导入事件类型
// ==========================================

/// 批量导入生命周期事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    /// 批次开始
    BatchStarted {
        batch_id: String,
        term_id: EntityId,
        rows: usize,
    },
    /// 考试已创建
    RowCreated {
        row_number: usize,
        exam_id: EntityId,
    },
    /// 重复行（未创建）
    RowDuplicate {
        row_number: usize,
        course_code: String,
    },
    /// 行创建失败
    RowFailed { row_number: usize, message: String },
    /// 行被跳过（标题为空）
    RowSkipped { row_number: usize },
    /// 分配已创建
    AllocationCreated {
        row_number: usize,
        exam_id: EntityId,
        allocation_id: EntityId,
        room_id: EntityId,
    },
    /// 分配条件不足而跳过
    AllocationSkipped {
        row_number: usize,
        exam_id: Option<EntityId>,
        reason: String,
    },
    /// 分配创建失败（考试保留）
    AllocationFailed {
        row_number: usize,
        exam_id: EntityId,
        message: String,
    },
    /// 容量或重叠警告
    CapacityWarning {
        row_number: usize,
        room_id: EntityId,
        capacity: CapacityInfo,
    },
    /// 批次结束
    BatchFinished {
        batch_id: String,
        imported: usize,
        failed: usize,
        warnings: usize,
        elapsed_ms: u64,
    },
}

impl ImportEvent {
    /// 事件名
    pub fn as_str(&self) -> &str {
        match self {
            ImportEvent::BatchStarted { .. } => "BatchStarted",
            ImportEvent::RowCreated { .. } => "RowCreated",
            ImportEvent::RowDuplicate { .. } => "RowDuplicate",
            ImportEvent::RowFailed { .. } => "RowFailed",
            ImportEvent::RowSkipped { .. } => "RowSkipped",
            ImportEvent::AllocationCreated { .. } => "AllocationCreated",
            ImportEvent::AllocationSkipped { .. } => "AllocationSkipped",
            ImportEvent::AllocationFailed { .. } => "AllocationFailed",
            ImportEvent::CapacityWarning { .. } => "CapacityWarning",
            ImportEvent::BatchFinished { .. } => "BatchFinished",
        }
    }
}

// ==========================================
// 事件接收 Trait
// ==========================================

/// 导入事件接收者
///
/// 接收失败不得影响导入流程，因此 `emit` 不返回错误
pub trait ImportEventSink: Send + Sync {
    fn emit(&self, event: ImportEvent);
}

/// 空操作接收者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

impl ImportEventSink for NoOpEventSink {
    fn emit(&self, event: ImportEvent) {
        tracing::trace!(event = event.as_str(), "NoOpEventSink: 跳过事件");
    }
}

/// 收集型接收者（测试与 CLI 汇总使用）
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<ImportEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已收集事件的快照
    pub fn events(&self) -> Vec<ImportEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == name).count()
    }
}

impl ImportEventSink for CollectingEventSink {
    fn emit(&self, event: ImportEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// 可选的事件接收者包装
///
/// 简化 Option<Arc<dyn ImportEventSink>> 的使用
#[derive(Clone, Default)]
pub struct OptionalEventSink {
    inner: Option<Arc<dyn ImportEventSink>>,
}

impl OptionalEventSink {
    pub fn with_sink(sink: Arc<dyn ImportEventSink>) -> Self {
        Self { inner: Some(sink) }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn emit(&self, event: ImportEvent) {
        match &self.inner {
            Some(sink) => sink.emit(event),
            None => {
                tracing::trace!(event = event.as_str(), "OptionalEventSink: 未配置接收者，跳过事件");
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl std::fmt::Debug for OptionalEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionalEventSink")
            .field("configured", &self.is_configured())
            .finish()
    }
}
