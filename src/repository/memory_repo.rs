// ==========================================
// 考试排考系统 - 内存仓储实现
// ==========================================
// 职责: 进程内的远端排考服务替身（测试 / 离线演示）
// 规则: 与远端一致地强制 (course_code, term) 唯一；可注入失败
// ==========================================

use crate::domain::exam::{
    Allocation, CreateAllocationPayload, CreateExamPayload, Exam, LegacyPlacement, Room, Term,
    UpdateAllocationPayload,
};
use crate::domain::types::EntityId;
use crate::repository::error::{FieldErrors, RepositoryError, RepositoryResult};
use crate::repository::exam_board_repo::ExamBoardRepository;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// 可注入的失败点
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// 创建这些标题的考试时返回 500
    pub exam_titles: HashSet<String>,
    /// 创建分配总是失败
    pub allocations: bool,
    /// 读取列表总是失败
    pub reads: bool,
}

#[derive(Debug, Default)]
struct Store {
    terms: Vec<Term>,
    rooms: Vec<Room>,
    exams: Vec<Exam>,
    allocations: Vec<Allocation>,
    next_id: EntityId,
    failures: FailurePlan,
}

impl Store {
    fn next_id(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }
}

// ==========================================
// InMemoryExamBoardRepository
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryExamBoardRepository {
    store: Mutex<Store>,
}

impl InMemoryExamBoardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|e| RepositoryError::InternalError(format!("锁获取失败: {}", e)))
    }

    /// 预置学期
    pub fn with_terms(self, terms: Vec<Term>) -> Self {
        if let Ok(mut store) = self.store.lock() {
            store.terms = terms;
        }
        self
    }

    /// 预置考场
    pub fn with_rooms(self, rooms: Vec<Room>) -> Self {
        if let Ok(mut store) = self.store.lock() {
            store.rooms = rooms;
        }
        self
    }

    /// 预置考试（ID 计数器前移）
    pub fn with_exams(self, exams: Vec<Exam>) -> Self {
        if let Ok(mut store) = self.store.lock() {
            let max_id = exams.iter().map(|e| e.id).max().unwrap_or(0);
            store.next_id = store.next_id.max(max_id);
            store.exams.extend(exams);
        }
        self
    }

    /// 预置分配（ID 计数器前移）
    pub fn with_allocations(self, allocations: Vec<Allocation>) -> Self {
        if let Ok(mut store) = self.store.lock() {
            let max_id = allocations.iter().map(|a| a.id).max().unwrap_or(0);
            store.next_id = store.next_id.max(max_id);
            store.allocations.extend(allocations);
        }
        self
    }

    pub fn with_failures(self, failures: FailurePlan) -> Self {
        if let Ok(mut store) = self.store.lock() {
            store.failures = failures;
        }
        self
    }

    /// 当前考试快照
    pub fn exams(&self) -> Vec<Exam> {
        self.lock().map(|s| s.exams.clone()).unwrap_or_default()
    }

    /// 当前分配快照
    pub fn allocations(&self) -> Vec<Allocation> {
        self.lock().map(|s| s.allocations.clone()).unwrap_or_default()
    }

    fn check_reads(store: &Store) -> RepositoryResult<()> {
        if store.failures.reads {
            return Err(RepositoryError::Http {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExamBoardRepository for InMemoryExamBoardRepository {
    async fn list_terms(&self) -> RepositoryResult<Vec<Term>> {
        let store = self.lock()?;
        Self::check_reads(&store)?;
        Ok(store.terms.clone())
    }

    async fn list_rooms(&self) -> RepositoryResult<Vec<Room>> {
        let store = self.lock()?;
        Self::check_reads(&store)?;
        Ok(store.rooms.clone())
    }

    async fn list_exams(&self, term_id: EntityId) -> RepositoryResult<Vec<Exam>> {
        let store = self.lock()?;
        Self::check_reads(&store)?;
        Ok(store
            .exams
            .iter()
            .filter(|e| e.term == term_id)
            .cloned()
            .collect())
    }

    async fn list_allocations(&self) -> RepositoryResult<Vec<Allocation>> {
        let store = self.lock()?;
        Self::check_reads(&store)?;
        Ok(store.allocations.clone())
    }

    async fn create_exam(&self, payload: &CreateExamPayload) -> RepositoryResult<Exam> {
        let mut store = self.lock()?;

        if store.failures.exam_titles.contains(&payload.title) {
            return Err(RepositoryError::Http {
                status: 500,
                body: "internal server error".to_string(),
            });
        }

        if payload.title.trim().is_empty() {
            let mut fields = FieldErrors::new();
            fields.insert("title".to_string(), vec!["This field may not be blank.".to_string()]);
            return Err(RepositoryError::Validation(fields));
        }

        let code = payload
            .course_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if let Some(code) = code {
            let taken = store
                .exams
                .iter()
                .any(|e| e.term == payload.term && e.trimmed_course_code() == Some(code));
            if taken {
                let mut fields = FieldErrors::new();
                fields.insert(
                    "non_field_errors".to_string(),
                    vec!["The fields course_code, term must make a unique set.".to_string()],
                );
                return Err(RepositoryError::Validation(fields));
            }
        }

        let id = store.next_id();
        let exam = Exam {
            id,
            title: payload.title.clone(),
            course_code: payload.course_code.clone(),
            term: payload.term,
            owner: Some(payload.owner),
            expected_students: payload.expected_students,
            duration_minutes: payload.duration_minutes,
            legacy: LegacyPlacement {
                date: payload.date,
                time: payload.time,
                location: payload.location.clone(),
            },
        };
        store.exams.push(exam.clone());
        Ok(exam)
    }

    async fn create_allocation(
        &self,
        payload: &CreateAllocationPayload,
    ) -> RepositoryResult<Allocation> {
        let mut store = self.lock()?;
        if store.failures.allocations {
            return Err(RepositoryError::Http {
                status: 500,
                body: "allocation rejected".to_string(),
            });
        }
        if !store.exams.iter().any(|e| e.id == payload.exam) {
            return Err(RepositoryError::NotFound {
                entity: "Exam".to_string(),
                id: payload.exam.to_string(),
            });
        }

        let id = store.next_id();
        let allocation = Allocation {
            id,
            exam: payload.exam,
            room: payload.room,
            start_at: Some(payload.start_at),
            end_at: Some(payload.end_at),
            allocated_seats: payload.allocated_seats,
        };
        store.allocations.push(allocation.clone());
        Ok(allocation)
    }

    async fn update_allocation(
        &self,
        id: EntityId,
        payload: &UpdateAllocationPayload,
    ) -> RepositoryResult<Allocation> {
        let mut store = self.lock()?;
        let allocation = store
            .allocations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Allocation".to_string(),
                id: id.to_string(),
            })?;

        if let Some(room) = payload.room {
            allocation.room = Some(room);
        }
        if let Some(start) = payload.start_at {
            allocation.start_at = Some(start);
        }
        if let Some(end) = payload.end_at {
            allocation.end_at = Some(end);
        }
        if let Some(seats) = payload.allocated_seats {
            allocation.allocated_seats = Some(seats);
        }
        Ok(allocation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(title: &str, code: Option<&str>) -> CreateExamPayload {
        CreateExamPayload {
            title: title.to_string(),
            course_code: code.map(str::to_string),
            term: 1,
            owner: 1,
            date: None,
            time: None,
            duration_minutes: None,
            expected_students: Some(10),
            location: None,
        }
    }

    #[tokio::test]
    async fn test_unique_course_code_per_term() {
        let repo = InMemoryExamBoardRepository::new();
        repo.create_exam(&payload("A", Some("X1"))).await.unwrap();
        let err = repo.create_exam(&payload("B", Some(" X1 "))).await.unwrap_err();
        assert!(err.is_duplicate_violation());

        // 无课程代码不受约束
        repo.create_exam(&payload("C", None)).await.unwrap();
        repo.create_exam(&payload("C", None)).await.unwrap();
        assert_eq!(repo.list_exams(1).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mut failures = FailurePlan::default();
        failures.exam_titles.insert("Boom".to_string());
        failures.reads = true;
        let repo = InMemoryExamBoardRepository::new().with_failures(failures);
        assert!(repo.create_exam(&payload("Boom", None)).await.is_err());
        assert!(repo.list_rooms().await.is_err());
    }

    #[tokio::test]
    async fn test_update_allocation_patches_fields() {
        let repo = InMemoryExamBoardRepository::new();
        let exam = repo.create_exam(&payload("A", None)).await.unwrap();
        let start = chrono::NaiveDate::from_ymd_opt(2026, 1, 8)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();
        let created = repo
            .create_allocation(&CreateAllocationPayload {
                exam: exam.id,
                room: Some(1),
                start_at: start,
                end_at: start + chrono::Duration::minutes(90),
                allocated_seats: Some(10),
            })
            .await
            .unwrap();

        let updated = repo
            .update_allocation(
                created.id,
                &UpdateAllocationPayload {
                    room: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.room, Some(2));
        assert_eq!(updated.start_at, Some(start));

        let missing = repo
            .update_allocation(999, &UpdateAllocationPayload::default())
            .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    }
}
