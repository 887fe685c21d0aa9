// ==========================================
// 考试排考系统 - 远端排考服务 Repository Trait
// ==========================================
// 职责: 定义学期/考场/考试/分配的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做远端读写
// 约束: 列表接口必须读尽全部分页后再返回
// ==========================================

use crate::domain::exam::{
    Allocation, CreateAllocationPayload, CreateExamPayload, Exam, Room, Term,
    UpdateAllocationPayload,
};
use crate::domain::types::EntityId;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ExamBoardRepository Trait
// ==========================================
// 实现者: RestExamBoardRepository（reqwest）、InMemoryExamBoardRepository（测试）
#[async_trait]
pub trait ExamBoardRepository: Send + Sync {
    // ===== 读取（分页读尽）=====

    /// 全部学期（含已归档）
    async fn list_terms(&self) -> RepositoryResult<Vec<Term>>;

    /// 全部考场
    async fn list_rooms(&self) -> RepositoryResult<Vec<Room>>;

    /// 指定学期的考试
    ///
    /// # 参数
    /// - term_id: 学期 ID
    async fn list_exams(&self, term_id: EntityId) -> RepositoryResult<Vec<Exam>>;

    /// 全部分配
    async fn list_allocations(&self) -> RepositoryResult<Vec<Allocation>>;

    // ===== 写入 =====

    /// 创建考试
    ///
    /// # 返回
    /// - Ok(Exam): 远端分配了 ID 的考试
    /// - Err(Validation): 字段级校验失败（含唯一约束）
    async fn create_exam(&self, payload: &CreateExamPayload) -> RepositoryResult<Exam>;

    /// 创建分配
    async fn create_allocation(
        &self,
        payload: &CreateAllocationPayload,
    ) -> RepositoryResult<Allocation>;

    /// 局部更新分配
    ///
    /// # 参数
    /// - id: 分配 ID
    /// - payload: 缺省字段保持不变
    async fn update_allocation(
        &self,
        id: EntityId,
        payload: &UpdateAllocationPayload,
    ) -> RepositoryResult<Allocation>;
}
