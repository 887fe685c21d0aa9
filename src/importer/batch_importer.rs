// ==========================================
// 考试排考系统 - 批量导入编排器
// ==========================================
// 职责: 整合导入流程，从表格到远端排考服务
// 流程: 解析 → 表头解析 → 预取(考场/考试/分配) → 逐行(提取 → 查重 → 建考试 → 容量检查 → 建分配)
// 规则:
//   - 行严格顺序处理；单行远端失败不中断批次
//   - 查重键 = 课程代码.trim() + "|" + 学期ID；先查已有考试，再查本批次
//   - 预取失败降级为空集合
//   - 分配失败不回滚考试，仅记录日志
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::exam::{CreateAllocationPayload, CreateExamPayload, Exam};
use crate::domain::import::{CapacityInfo, ImportSummary, OutcomeKind, ParsedExamRecord, RowOutcome};
use crate::domain::types::{AllocationSkipPolicy, CapacityPolicy, EntityId};
use crate::engine::conflict::{Booking, BookingLedger, Interval};
use crate::engine::events::{ImportEvent, ImportEventSink, OptionalEventSink};
use crate::engine::schedule::{allocation_ledger, RoomDirectory};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{SheetGrid, UniversalFileParser};
use crate::importer::header_resolver::{resolve_headers, SynonymTable};
use crate::importer::importer_trait::{ExamImporter, FileParser, RecordExtractor};
use crate::importer::row_extractor::RowExtractor;
use crate::repository::ExamBoardRepository;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 提示前缀
pub const WARNING_PREFIX: &str = "⚠ هشدار: ";
/// 未知标题 / 课程代码的占位文本
const UNKNOWN_LABEL: &str = "نامشخص";

// ==========================================
// ImportPolicy - 批次内固定的导入策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportPolicy {
    pub default_duration_minutes: u32,
    pub default_expected_students: Option<u32>,
    pub owner_id: EntityId,
    pub allocation_skip: AllocationSkipPolicy,
    pub capacity: CapacityPolicy,
}

impl ImportPolicy {
    async fn load<C: ImportConfigReader>(config: &C) -> ImportResult<Self> {
        Ok(Self {
            default_duration_minutes: config.get_default_duration_minutes().await?,
            default_expected_students: config.get_default_expected_students().await?,
            owner_id: config.get_owner_id().await?,
            allocation_skip: config.get_allocation_skip_policy().await?,
            capacity: config.get_capacity_policy().await?,
        })
    }
}

/// 批次上下文（预取数据 + 批次内簿记）
struct BatchContext {
    term_id: EntityId,
    policy: ImportPolicy,
    directory: RoomDirectory,
    /// 远端已有考试的查重键
    existing_keys: HashSet<String>,
    /// 本批次已处理的查重键
    batch_keys: HashSet<String>,
    ledger: BookingLedger,
}

impl BatchContext {
    fn duplicate_key(&self, code: &str) -> String {
        format!("{}|{}", code, self.term_id)
    }
}

/// 行处理期间累积的提示与容量快照
#[derive(Debug, Default)]
struct RowNotes {
    notes: Vec<String>,
    capacity: Option<CapacityInfo>,
}

// ==========================================
// ExamBatchImporter - 批量导入编排器
// ==========================================
pub struct ExamBatchImporter<R, C>
where
    R: ExamBoardRepository,
    C: ImportConfigReader,
{
    // 数据访问层
    repo: R,

    // 配置读取器
    config: C,

    // 导入组件
    file_parser: Box<dyn FileParser>,
    extractor: Box<dyn RecordExtractor>,
    synonyms: SynonymTable,

    // 事件接收者
    events: OptionalEventSink,
}

impl<R, C> ExamBatchImporter<R, C>
where
    R: ExamBoardRepository,
    C: ImportConfigReader,
{
    /// 创建新的导入器实例
    ///
    /// # 参数
    /// - repo: 远端排考服务仓储
    /// - config: 配置读取器
    /// - file_parser: 文件解析器
    /// - extractor: 行提取器
    pub fn new(
        repo: R,
        config: C,
        file_parser: Box<dyn FileParser>,
        extractor: Box<dyn RecordExtractor>,
    ) -> Self {
        Self {
            repo,
            config,
            file_parser,
            extractor,
            synonyms: SynonymTable::standard(),
            events: OptionalEventSink::none(),
        }
    }

    /// 使用默认组件（按扩展名解析 + 标准行提取）
    pub fn with_defaults(repo: R, config: C) -> Self {
        Self::new(
            repo,
            config,
            Box::new(UniversalFileParser),
            Box::new(RowExtractor),
        )
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ImportEventSink>) -> Self {
        self.events = OptionalEventSink::with_sink(sink);
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    // ===== 预取 =====

    async fn prefetch(&self, term_id: EntityId, policy: ImportPolicy) -> BatchContext {
        let rooms = self.repo.list_rooms().await.unwrap_or_else(|e| {
            warn!(error = %e, "考场列表读取失败，按空目录处理");
            Vec::new()
        });
        let exams = self.repo.list_exams(term_id).await.unwrap_or_else(|e| {
            warn!(error = %e, term_id, "已有考试读取失败，按空集合处理");
            Vec::new()
        });
        let allocations = self.repo.list_allocations().await.unwrap_or_else(|e| {
            warn!(error = %e, "分配列表读取失败，按空集合处理");
            Vec::new()
        });

        let existing_keys = exams
            .iter()
            .filter_map(|e| e.trimmed_course_code().map(|code| format!("{}|{}", code, e.term)))
            .collect();
        let ledger = allocation_ledger(&exams, &allocations);

        info!(
            rooms = rooms.len(),
            exams = exams.len(),
            allocations = allocations.len(),
            bookings = ledger.len(),
            "预取完成"
        );

        BatchContext {
            term_id,
            policy,
            directory: RoomDirectory::new(rooms),
            existing_keys,
            batch_keys: HashSet::new(),
            ledger,
        }
    }

    // ===== 单行处理 =====

    fn push_duplicate(&self, summary: &mut ImportSummary, record: &ParsedExamRecord, message: String) {
        warn!(row = record.row_number, title = %record.title, "重复考试，跳过");
        self.events.emit(ImportEvent::RowDuplicate {
            row_number: record.row_number,
            course_code: record.trimmed_course_code().unwrap_or(UNKNOWN_LABEL).to_string(),
        });
        summary.push_outcome(RowOutcome {
            row_number: record.row_number,
            label: record.title.clone(),
            kind: OutcomeKind::Duplicate,
            message: format!("{}{}", WARNING_PREFIX, message),
            capacity: None,
        });
    }

    async fn process_record(
        &self,
        ctx: &mut BatchContext,
        mut record: ParsedExamRecord,
        summary: &mut ImportSummary,
    ) {
        let mut row = RowNotes {
            notes: std::mem::take(&mut record.notes),
            capacity: None,
        };

        // ===== 1. 缺省人数 =====
        if record.expected_students.is_none() {
            if let Some(default) = ctx.policy.default_expected_students {
                record.expected_students = Some(default);
                row.notes.push(format!(
                    "تعداد دانشجو مشخص نشده - مقدار پیش‌فرض {} تنظیم شد",
                    default
                ));
            }
        }

        // ===== 2. 查重 =====
        let course_code = record.trimmed_course_code().map(str::to_string);
        if let Some(code) = &course_code {
            let key = ctx.duplicate_key(code);
            if ctx.existing_keys.contains(&key) {
                let message = format!(
                    "این درس با کد {} قبلاً در این ترم ثبت شده است - نادیده گرفته شد",
                    code
                );
                self.push_duplicate(summary, &record, message);
                return;
            }
            if !ctx.batch_keys.insert(key) {
                let message = format!(
                    "این درس با کد {} در همین فایل تکراری است - نادیده گرفته شد",
                    code
                );
                self.push_duplicate(summary, &record, message);
                return;
            }
        }

        // ===== 3. 考场解析 =====
        let room_id = record
            .location
            .as_deref()
            .and_then(|label| ctx.directory.resolve(label));
        if let (Some(label), None) = (record.location.as_deref(), room_id) {
            warn!(row = record.row_number, location = %label, "考场名称未找到，考试将不带考场创建");
        }
        let location = room_id
            .map(|id| id.to_string())
            .or_else(|| record.location.clone());

        // ===== 4. 创建考试 =====
        let payload = CreateExamPayload {
            title: record.title.trim().to_string(),
            course_code: course_code.clone(),
            term: ctx.term_id,
            owner: ctx.policy.owner_id,
            date: record.date,
            time: record.time,
            duration_minutes: record.duration_minutes,
            expected_students: record.expected_students,
            location,
        };

        let created = match self.repo.create_exam(&payload).await {
            Ok(exam) => exam,
            Err(e) if e.is_duplicate_violation() => {
                let message = format!(
                    "این درس با کد {} قبلاً در این ترم ثبت شده است - نادیده گرفته شد",
                    course_code.as_deref().unwrap_or(UNKNOWN_LABEL)
                );
                self.push_duplicate(summary, &record, message);
                return;
            }
            Err(e) => {
                let message = e.user_message();
                error!(row = record.row_number, title = %record.title, error = %e, "考试创建失败");
                self.events.emit(ImportEvent::RowFailed {
                    row_number: record.row_number,
                    message: message.clone(),
                });
                summary.push_outcome(RowOutcome {
                    row_number: record.row_number,
                    label: record.title.clone(),
                    kind: OutcomeKind::Failed,
                    message,
                    capacity: None,
                });
                return;
            }
        };

        debug!(row = record.row_number, exam_id = created.id, "考试已创建");
        self.events.emit(ImportEvent::RowCreated {
            row_number: record.row_number,
            exam_id: created.id,
        });
        if let Some(code) = created.trimmed_course_code() {
            ctx.existing_keys.insert(format!("{}|{}", code, created.term));
        }

        // ===== 5. 创建分配 =====
        if self.allocate(ctx, &record, &created, room_id, &mut row).await {
            summary.allocations_created += 1;
        }
        summary.push_created(created);

        if !row.notes.is_empty() {
            summary.push_outcome(RowOutcome {
                row_number: record.row_number,
                label: record.title.clone(),
                kind: OutcomeKind::CreatedWithWarnings,
                message: format!("{}{}", WARNING_PREFIX, row.notes.join(" | ")),
                capacity: row.capacity,
            });
        }
    }

    /// 按条件创建分配，返回是否创建成功
    ///
    /// # 条件
    /// 考试 ID、日期、时间、已解析考场 ID、正的人数 全部具备
    async fn allocate(
        &self,
        ctx: &mut BatchContext,
        record: &ParsedExamRecord,
        exam: &Exam,
        room_id: Option<EntityId>,
        row: &mut RowNotes,
    ) -> bool {
        let seats = record.expected_students.filter(|n| *n > 0);
        let (date, time, room_id, seats) = match (record.date, record.time, room_id, seats) {
            (Some(d), Some(t), Some(r), Some(s)) => (d, t, r, s),
            _ => {
                let mut missing = Vec::new();
                if record.date.is_none() {
                    missing.push("تاریخ");
                }
                if record.time.is_none() {
                    missing.push("ساعت");
                }
                if room_id.is_none() {
                    missing.push("سالن");
                }
                if seats.is_none() {
                    missing.push("تعداد دانشجو");
                }
                let reason = missing.join("، ");
                debug!(row = record.row_number, exam_id = exam.id, missing = %reason, "分配条件不足，跳过");
                self.events.emit(ImportEvent::AllocationSkipped {
                    row_number: record.row_number,
                    exam_id: Some(exam.id),
                    reason: reason.clone(),
                });
                if ctx.policy.allocation_skip == AllocationSkipPolicy::Warn {
                    row.notes
                        .push(format!("تخصیص سالن ایجاد نشد - اطلاعات ناقص: {}", reason));
                }
                return false;
            }
        };

        let duration = record
            .duration_minutes
            .unwrap_or(ctx.policy.default_duration_minutes);
        let interval = Interval::new(date, time, Some(duration));

        // ===== 容量检查 =====
        if let Some(room) = ctx.directory.get(room_id) {
            let info = ctx.ledger.available_capacity(room, &interval, Some(exam.id));
            let overbooked = !info.fits(seats);
            if info.overlapping_count > 0 {
                row.notes.push(format!(
                    "تداخل زمانی با {} امتحان دیگر در سالن {}",
                    info.overlapping_count, room.name
                ));
            }
            if overbooked {
                row.notes.push(format!(
                    "ظرفیت سالن {} کافی نیست: {} دانشجو، ظرفیت باقی‌مانده {} از {}",
                    room.name, seats, info.available, info.total
                ));
            }
            if info.overlapping_count > 0 || overbooked {
                warn!(
                    row = record.row_number,
                    room_id,
                    used = info.used,
                    available = info.available,
                    overlapping = info.overlapping_count,
                    "容量检查发现重叠或超容"
                );
                self.events.emit(ImportEvent::CapacityWarning {
                    row_number: record.row_number,
                    room_id,
                    capacity: info,
                });
            }
            row.capacity = Some(info);

            if overbooked && ctx.policy.capacity == CapacityPolicy::SkipAllocation {
                row.notes
                    .push("تخصیص سالن به دلیل کمبود ظرفیت انجام نشد".to_string());
                self.events.emit(ImportEvent::AllocationSkipped {
                    row_number: record.row_number,
                    exam_id: Some(exam.id),
                    reason: "capacity".to_string(),
                });
                return false;
            }
        }

        let payload =
            CreateAllocationPayload::at_wall_clock(exam.id, room_id, date, time, duration, seats);
        match self.repo.create_allocation(&payload).await {
            Ok(allocation) => {
                debug!(
                    row = record.row_number,
                    exam_id = exam.id,
                    allocation_id = allocation.id,
                    "分配已创建"
                );
                ctx.ledger.book(Booking {
                    exam_id: exam.id,
                    allocation_id: Some(allocation.id),
                    room_id,
                    interval,
                    seats,
                });
                self.events.emit(ImportEvent::AllocationCreated {
                    row_number: record.row_number,
                    exam_id: exam.id,
                    allocation_id: allocation.id,
                    room_id,
                });
                true
            }
            Err(e) => {
                // 分配失败不影响考试本身
                error!(row = record.row_number, exam_id = exam.id, error = %e, "分配创建失败");
                self.events.emit(ImportEvent::AllocationFailed {
                    row_number: record.row_number,
                    exam_id: exam.id,
                    message: e.user_message(),
                });
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl<R, C> ExamImporter for ExamBatchImporter<R, C>
where
    R: ExamBoardRepository,
    C: ImportConfigReader,
{
    #[instrument(skip(self, file_path), fields(file = %file_path.display()))]
    async fn import_file(&self, file_path: &Path, term_id: EntityId) -> ImportResult<ImportSummary> {
        let grid = self.file_parser.parse_sheet(file_path).map_err(|e| {
            error!(error = %e, "文件解析失败");
            e
        })?;
        self.import_grid(grid, term_id).await
    }

    #[instrument(skip(self, grid), fields(batch_id = tracing::field::Empty))]
    async fn import_grid(&self, grid: SheetGrid, term_id: EntityId) -> ImportResult<ImportSummary> {
        let start_time = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());

        // === 步骤 1: 结构校验 ===
        if grid.headers.iter().all(|h| h.trim().is_empty()) || grid.rows.is_empty() {
            return Err(ImportError::EmptySheet);
        }
        let headers = resolve_headers(&grid.headers, &self.synonyms)?;
        if !grid.has_data() {
            return Err(ImportError::NoDataRows);
        }
        debug!(mapped = headers.len(), "表头解析完成");

        // === 步骤 2: 策略与预取 ===
        let policy = ImportPolicy::load(&self.config).await?;
        let mut ctx = self.prefetch(term_id, policy).await;

        info!(term_id, rows = grid.rows.len(), "开始导入考试");
        self.events.emit(ImportEvent::BatchStarted {
            batch_id: batch_id.clone(),
            term_id,
            rows: grid.rows.len(),
        });

        // === 步骤 3: 逐行处理 ===
        let mut summary = ImportSummary::new(batch_id.clone(), term_id);
        for (row_number, cells) in grid.numbered_rows() {
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            match self.extractor.extract(cells, row_number, &headers) {
                Some(record) => self.process_record(&mut ctx, record, &mut summary).await,
                None => {
                    debug!(row = row_number, "标题为空，跳过");
                    self.events.emit(ImportEvent::RowSkipped { row_number });
                    summary.push_outcome(RowOutcome {
                        row_number,
                        label: UNKNOWN_LABEL.to_string(),
                        kind: OutcomeKind::Skipped,
                        message: "عنوان امتحان الزامی است - این رکورد نادیده گرفته شد".to_string(),
                        capacity: None,
                    });
                }
            }
        }

        summary.elapsed_ms = i64::try_from(start_time.elapsed().as_millis()).unwrap_or(i64::MAX);
        info!(
            imported = summary.imported,
            failed = summary.failed,
            warnings = summary.warnings,
            skipped = summary.skipped,
            allocations = summary.allocations_created,
            elapsed_ms = summary.elapsed_ms,
            "导入完成"
        );
        self.events.emit(ImportEvent::BatchFinished {
            batch_id,
            imported: summary.imported,
            failed: summary.failed,
            warnings: summary.warnings,
            elapsed_ms: u64::try_from(summary.elapsed_ms).unwrap_or(0),
        });

        Ok(summary)
    }
}
