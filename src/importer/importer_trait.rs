// ==========================================
// 考试排考系统 - 导入 Trait
// ==========================================
// 职责: 定义导入管道各阶段接口（不包含实现）
// 管道: 文件解析 → 表头解析 → 行提取 → 编排落库
// ==========================================

use crate::domain::import::{ImportSummary, ParsedExamRecord};
use crate::domain::types::EntityId;
use crate::importer::error::ImportResult;
use crate::importer::file_parser::{CellValue, SheetGrid};
use crate::importer::header_resolver::HeaderMap;
use async_trait::async_trait;
use std::path::Path;

// ==========================================
// ExamImporter Trait
// ==========================================
// 用途: 批量导入主接口
// 实现者: ExamBatchImporter
#[async_trait]
pub trait ExamImporter: Send + Sync {
    /// 从文件导入考试（Excel 或 CSV，仅第一个工作表）
    ///
    /// # 参数
    /// - file_path: 文件路径
    /// - term_id: 目标学期
    ///
    /// # 返回
    /// - Ok(ImportSummary): 批次汇总（单行失败不会导致整批失败）
    /// - Err: 文件不可读、无数据行、缺少标题列等结构性错误
    async fn import_file(&self, file_path: &Path, term_id: EntityId)
        -> ImportResult<ImportSummary>;

    /// 从已解析的网格导入考试
    async fn import_grid(&self, grid: SheetGrid, term_id: EntityId)
        -> ImportResult<ImportSummary>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（阶段 0）
// 实现者: ExcelParser, CsvParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件第一个工作表为表头 + 数据行
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<SheetGrid>;
}

// ==========================================
// RecordExtractor Trait
// ==========================================
// 用途: 单行提取接口（阶段 2）
// 实现者: RowExtractor
pub trait RecordExtractor: Send + Sync {
    /// 将一行原始单元格转换为考试记录
    ///
    /// # 参数
    /// - row: 原始单元格
    /// - row_number: Excel 行号
    /// - headers: 表头映射
    ///
    /// # 返回
    /// - Some(ParsedExamRecord): 解析结果（非法片段已丢弃并记录在 notes）
    /// - None: 标题为空，跳过该行
    fn extract(
        &self,
        row: &[CellValue],
        row_number: usize,
        headers: &HeaderMap,
    ) -> Option<ParsedExamRecord>;
}
