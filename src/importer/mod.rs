// ==========================================
// 考试排考系统 - 导入层
// ==========================================
// 职责: 表格批量导入考试，以及学期考试导出
// 支持: Excel (.xlsx/.xls/.ods), CSV
// 流程: 文件解析 → 表头解析 → 行提取 → 批量编排
// ==========================================

// 模块声明
pub mod batch_importer;
pub mod error;
pub mod exporter;
pub mod file_parser;
pub mod header_resolver;
pub mod importer_trait;
pub mod row_extractor;
pub mod temporal;

// 重导出核心类型
pub use batch_importer::{ExamBatchImporter, ImportPolicy, WARNING_PREFIX};
pub use error::{ImportError, ImportResult};
pub use exporter::{export_rows, export_schedule, ExportFormat, ExportRow, EXPORT_HEADERS};
pub use file_parser::{CellValue, CsvParser, ExcelParser, SheetGrid, UniversalFileParser};
pub use header_resolver::{resolve_headers, HeaderMap, SynonymTable};
pub use row_extractor::RowExtractor;

// 重导出 Trait 接口
pub use importer_trait::{ExamImporter, FileParser, RecordExtractor};
