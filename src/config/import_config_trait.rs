// ==========================================
// 考试排考系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::error::ConfigResult;
use crate::domain::types::{AllocationSkipPolicy, CapacityPolicy, EntityId};
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 批量导入编排器所需的配置读取接口
// 实现者: ConfigManager（默认值 ← JSON 文件 ← 环境变量）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 考试默认值 =====

    /// 获取默认考试时长（分钟）
    ///
    /// # 默认值
    /// - 120
    async fn get_default_duration_minutes(&self) -> ConfigResult<u32>;

    /// 获取缺失人数时的默认预计人数
    ///
    /// # 返回
    /// - Some(n): 以 n 填充并追加提示
    /// - None: 不填充（配置为 none）
    ///
    /// # 默认值
    /// - 1
    async fn get_default_expected_students(&self) -> ConfigResult<Option<u32>>;

    /// 获取新建考试的负责人 ID
    ///
    /// # 默认值
    /// - 1
    async fn get_owner_id(&self) -> ConfigResult<EntityId>;

    // ===== 分配策略 =====

    /// 获取分配跳过提示策略
    ///
    /// # 默认值
    /// - silent
    async fn get_allocation_skip_policy(&self) -> ConfigResult<AllocationSkipPolicy>;

    /// 获取容量超限处理策略
    ///
    /// # 默认值
    /// - report
    async fn get_capacity_policy(&self) -> ConfigResult<CapacityPolicy>;
}
