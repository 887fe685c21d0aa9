// ==========================================
// 考试排考系统 - 导入与排考API
// ==========================================
// 职责: 封装批量导入、导出、容量检查、冲突与报表、改期
// 说明: 每次调用均从远端重新读取考场/考试/分配，不做跨调用缓存
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportConfigReader};
use crate::domain::exam::{Allocation, CreateAllocationPayload, Exam, Term, UpdateAllocationPayload};
use crate::domain::import::{CapacityInfo, ImportSummary};
use crate::domain::types::EntityId;
use crate::engine::conflict::Interval;
use crate::engine::events::ImportEventSink;
use crate::engine::reporting::{
    capacity_report, conflict_report, utilization_report, CapacityRow, ConflictReportGroup,
    ReportSettings, RoomUtilization,
};
use crate::engine::schedule::{allocation_ledger, RoomDirectory, ScheduleView};
use crate::importer::exporter::export_schedule;
use crate::importer::{ExamBatchImporter, ExamImporter};
use crate::repository::{ExamBoardRepository, RestExamBoardRepository};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 容量查询请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityQuery {
    /// 用于读取考试预计人数的学期
    pub term_id: EntityId,
    pub room_id: EntityId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// 缺省按 120 分钟
    pub duration_minutes: Option<u32>,
    /// 排除的考试（改期时排除自身）
    pub exclude_exam: Option<EntityId>,
}

/// 单场考试的冲突指示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamConflict {
    pub exam_id: EntityId,
    pub title: String,
    /// 同考场同日重叠的其他考试
    pub conflicts_with: Vec<EntityId>,
}

/// 改期请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub term_id: EntityId,
    pub allocation_id: EntityId,
    pub room_id: EntityId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: Option<u32>,
    /// 缺省沿用考试预计人数
    pub seats: Option<u32>,
    /// 接受重叠/超容（仅报告，不阻断）
    #[serde(default)]
    pub accept_conflict: bool,
}

/// 改期响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleResponse {
    pub allocation: Allocation,
    /// 改期前对目标时段的容量检查
    pub capacity: CapacityInfo,
}

/// 导入与排考API
pub struct ImportApi<R>
where
    R: ExamBoardRepository,
{
    importer: ExamBatchImporter<R, ConfigManager>,
    report_settings: ReportSettings,
}

impl ImportApi<RestExamBoardRepository> {
    /// 按配置连接远端排考服务
    pub fn from_config(config: ConfigManager) -> ApiResult<Self> {
        let settings = config.api_settings()?;
        let repo = RestExamBoardRepository::new(&settings.base_url, settings.token.clone())?;
        Self::new(repo, config)
    }
}

impl<R> ImportApi<R>
where
    R: ExamBoardRepository,
{
    /// 创建新的ImportApi实例
    pub fn new(repo: R, config: ConfigManager) -> ApiResult<Self> {
        let report_settings = config.report_settings()?;
        Ok(Self {
            importer: ExamBatchImporter::with_defaults(repo, config),
            report_settings,
        })
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ImportEventSink>) -> Self {
        self.importer = self.importer.with_event_sink(sink);
        self
    }

    pub fn repo(&self) -> &R {
        self.importer.repo()
    }

    fn check_term(term_id: EntityId) -> ApiResult<()> {
        if term_id <= 0 {
            return Err(ApiError::InvalidInput(format!("شناسه ترم نامعتبر: {}", term_id)));
        }
        Ok(())
    }

    /// 读取学期视图与考场目录
    async fn load_view(&self, term_id: EntityId) -> ApiResult<(ScheduleView, RoomDirectory)> {
        Self::check_term(term_id)?;
        let rooms = self.repo().list_rooms().await?;
        let exams = self.repo().list_exams(term_id).await?;
        let allocations = self.repo().list_allocations().await?;
        Ok((ScheduleView::build(exams, &allocations), RoomDirectory::new(rooms)))
    }

    // ==========================================
    // 导入 / 导出
    // ==========================================

    /// 批量导入考试
    ///
    /// # 参数
    /// - file_path: .xlsx/.xls/.ods/.csv 文件
    /// - term_id: 目标学期
    ///
    /// # 返回
    /// - Ok(ImportSummary): 各行结果（行级失败不会使整批失败）
    /// - Err(ApiError): 结构性错误（空表、缺少标题列、格式不支持）
    #[instrument(skip(self, file_path), fields(file = %file_path.display()))]
    pub async fn import_exams(&self, file_path: &Path, term_id: EntityId) -> ApiResult<ImportSummary> {
        Self::check_term(term_id)?;
        let summary = self.importer.import_file(file_path, term_id).await?;
        Ok(summary)
    }

    /// 导出学期考试
    ///
    /// # 返回
    /// - 写出的行数
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn export_exams(&self, term_id: EntityId, path: &Path) -> ApiResult<usize> {
        let (view, directory) = self.load_view(term_id).await?;
        Ok(export_schedule(&view, &directory, path)?)
    }

    // ==========================================
    // 容量与冲突
    // ==========================================

    /// 查询考场在候选时段的剩余容量
    #[instrument(skip(self))]
    pub async fn check_capacity(&self, query: &CapacityQuery) -> ApiResult<CapacityInfo> {
        Self::check_term(query.term_id)?;
        let rooms = self.repo().list_rooms().await?;
        let directory = RoomDirectory::new(rooms);
        let room = directory
            .get(query.room_id)
            .ok_or_else(|| ApiError::NotFound(format!("Room (id={})", query.room_id)))?;

        let exams = self.repo().list_exams(query.term_id).await?;
        let allocations = self.repo().list_allocations().await?;
        let ledger = allocation_ledger(&exams, &allocations);
        let interval = Interval::new(query.date, query.time, query.duration_minutes);
        Ok(ledger.available_capacity(room, &interval, query.exclude_exam))
    }

    /// 学期内每场考试的冲突指示（仅列出存在冲突的考试）
    pub async fn exam_conflicts(&self, term_id: EntityId) -> ApiResult<Vec<ExamConflict>> {
        let (view, directory) = self.load_view(term_id).await?;
        let ledger = view.ledger(&directory);
        Ok(view
            .entries()
            .iter()
            .filter_map(|(exam, _)| {
                let conflicts_with = ledger.conflicts_for(exam.id);
                (!conflicts_with.is_empty()).then(|| ExamConflict {
                    exam_id: exam.id,
                    title: exam.title.clone(),
                    conflicts_with,
                })
            })
            .collect())
    }

    // ==========================================
    // 报表
    // ==========================================

    pub async fn conflict_report(&self, term_id: EntityId) -> ApiResult<Vec<ConflictReportGroup>> {
        let (view, directory) = self.load_view(term_id).await?;
        Ok(conflict_report(&view, &directory))
    }

    pub async fn capacity_report(&self, term_id: EntityId) -> ApiResult<Vec<CapacityRow>> {
        let (view, directory) = self.load_view(term_id).await?;
        Ok(capacity_report(&view, &directory))
    }

    pub async fn utilization_report(&self, term_id: EntityId) -> ApiResult<Vec<RoomUtilization>> {
        let (view, directory) = self.load_view(term_id).await?;
        Ok(utilization_report(&view, &directory, &self.report_settings))
    }

    // ==========================================
    // 改期
    // ==========================================

    /// 将已有分配改到新的考场/时段
    ///
    /// # 规则
    /// - 目标时段与其他考试重叠或人数超出剩余容量时，
    ///   除非 accept_conflict = true，否则返回 ScheduleConflict
    #[instrument(skip(self, request), fields(allocation_id = request.allocation_id))]
    pub async fn reschedule_allocation(
        &self,
        request: &RescheduleRequest,
    ) -> ApiResult<RescheduleResponse> {
        Self::check_term(request.term_id)?;
        let rooms = self.repo().list_rooms().await?;
        let exams = self.repo().list_exams(request.term_id).await?;
        let allocations = self.repo().list_allocations().await?;

        let current = allocations
            .iter()
            .find(|a| a.id == request.allocation_id)
            .ok_or_else(|| ApiError::NotFound(format!("Allocation (id={})", request.allocation_id)))?;
        let directory = RoomDirectory::new(rooms);
        let room = directory
            .get(request.room_id)
            .ok_or_else(|| ApiError::NotFound(format!("Room (id={})", request.room_id)))?;

        let exam: Option<&Exam> = exams.iter().find(|e| e.id == current.exam);
        let duration = request
            .duration_minutes
            .or_else(|| exam.and_then(|e| e.duration_minutes))
            .unwrap_or(self.importer.config().get_default_duration_minutes().await?);
        let seats = request
            .seats
            .or_else(|| exam.and_then(|e| e.expected_students))
            .or(current.allocated_seats)
            .unwrap_or(0);

        let ledger = allocation_ledger(&exams, &allocations);
        let interval = Interval::new(request.date, request.time, Some(duration));
        let capacity = ledger.available_capacity(room, &interval, Some(current.exam));

        if capacity.overlapping_count > 0 || !capacity.fits(seats) {
            if !request.accept_conflict {
                return Err(ApiError::ScheduleConflict {
                    room_id: room.id,
                    overlapping_count: capacity.overlapping_count,
                    available: capacity.available,
                    total: capacity.total,
                });
            }
            warn!(
                room_id = room.id,
                overlapping = capacity.overlapping_count,
                available = capacity.available,
                seats,
                "改期已接受冲突"
            );
        }

        let target = CreateAllocationPayload::at_wall_clock(
            current.exam,
            room.id,
            request.date,
            request.time,
            duration,
            seats,
        );
        let payload = UpdateAllocationPayload {
            room: target.room,
            start_at: Some(target.start_at),
            end_at: Some(target.end_at),
            allocated_seats: target.allocated_seats,
        };
        let allocation = self
            .repo()
            .update_allocation(request.allocation_id, &payload)
            .await?;
        info!(room_id = room.id, start_at = %target.start_at, "分配已改期");

        Ok(RescheduleResponse {
            allocation,
            capacity,
        })
    }

    // ==========================================
    // 学期
    // ==========================================

    /// 可选择的学期（排除已归档）
    pub async fn active_terms(&self) -> ApiResult<Vec<Term>> {
        let terms = self.repo().list_terms().await?;
        Ok(crate::domain::exam::active_terms(&terms)
            .into_iter()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exam::{LegacyPlacement, Room};
    use crate::repository::InMemoryExamBoardRepository;
    use chrono::{TimeZone, Utc};

    fn exam(id: EntityId, students: u32) -> Exam {
        Exam {
            id,
            title: format!("Exam {}", id),
            course_code: Some(format!("C{}", id)),
            term: 1,
            owner: Some(1),
            expected_students: Some(students),
            duration_minutes: Some(90),
            legacy: LegacyPlacement::default(),
        }
    }

    fn allocation(id: EntityId, exam: EntityId, hour: u32) -> Allocation {
        let start = Utc.with_ymd_and_hms(2026, 1, 8, hour, 0, 0).unwrap();
        Allocation {
            id,
            exam,
            room: Some(1),
            start_at: Some(start),
            end_at: Some(start + chrono::Duration::minutes(90)),
            allocated_seats: None,
        }
    }

    fn api() -> ImportApi<InMemoryExamBoardRepository> {
        let repo = InMemoryExamBoardRepository::new()
            .with_rooms(vec![
                Room {
                    id: 1,
                    name: "Room A".to_string(),
                    capacity: 40,
                    category: None,
                },
                Room {
                    id: 2,
                    name: "Room B".to_string(),
                    capacity: 100,
                    category: None,
                },
            ])
            .with_exams(vec![exam(10, 30), exam(11, 20), exam(12, 5)])
            .with_allocations(vec![
                allocation(100, 10, 9),
                allocation(101, 11, 10),
                allocation(102, 12, 14),
            ]);
        ImportApi::new(repo, ConfigManager::new()).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 8).unwrap()
    }

    #[tokio::test]
    async fn test_check_capacity_counts_overlaps() {
        let api = api();
        let info = api
            .check_capacity(&CapacityQuery {
                term_id: 1,
                room_id: 1,
                date: date(),
                time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                duration_minutes: Some(30),
                exclude_exam: None,
            })
            .await
            .unwrap();
        assert_eq!(info.overlapping_count, 2);
        assert_eq!(info.used, 50);
        assert_eq!(info.available, 0);
    }

    #[tokio::test]
    async fn test_check_capacity_unknown_room() {
        let api = api();
        let err = api
            .check_capacity(&CapacityQuery {
                term_id: 1,
                room_id: 99,
                date: date(),
                time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                duration_minutes: None,
                exclude_exam: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_exam_conflicts_lists_clashing_pairs() {
        let api = api();
        let conflicts = api.exam_conflicts(1).await.unwrap();
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].exam_id, 10);
        assert_eq!(conflicts[0].conflicts_with, vec![11]);
        assert_eq!(conflicts[1].conflicts_with, vec![10]);
    }

    #[tokio::test]
    async fn test_reschedule_rejects_conflict_unless_accepted() {
        let api = api();
        let mut request = RescheduleRequest {
            term_id: 1,
            allocation_id: 102,
            room_id: 1,
            date: date(),
            time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            duration_minutes: None,
            seats: None,
            accept_conflict: false,
        };
        let err = api.reschedule_allocation(&request).await.unwrap_err();
        assert!(matches!(err, ApiError::ScheduleConflict { overlapping_count: 2, .. }));

        request.accept_conflict = true;
        let response = api.reschedule_allocation(&request).await.unwrap();
        assert_eq!(response.capacity.overlapping_count, 2);
        assert_eq!(
            response.allocation.start_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 8, 9, 30, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_reschedule_to_free_room() {
        let api = api();
        let request = RescheduleRequest {
            term_id: 1,
            allocation_id: 101,
            room_id: 2,
            date: date(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            duration_minutes: Some(60),
            seats: None,
            accept_conflict: false,
        };
        let response = api.reschedule_allocation(&request).await.unwrap();
        assert_eq!(response.allocation.room, Some(2));
        assert_eq!(response.allocation.allocated_seats, Some(20));
        assert_eq!(
            response.allocation.end_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 8, 11, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_invalid_term_is_rejected() {
        let api = api();
        let err = api.conflict_report(0).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }
}
