// ==========================================
// 考试排考系统 - 文件解析器实现
// ==========================================
// 阶段 0: 文件读取与解析（仅读取第一个工作表）
// 支持: Excel (.xlsx/.xlsm/.xls/.ods) / CSV (.csv)
// 输出: 表头行 + 类型化单元格网格
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::FileParser;
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;
use tracing::debug;

// ==========================================
// 单元格与网格
// ==========================================

/// 单元格值
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    /// 数值（Excel 日期/时间以序列号表示）
    Number(f64),
    Empty,
}

impl CellValue {
    /// 由原文构造（去除首尾空白，空串为 Empty）
    pub fn text(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// 文本形式；整数值不带小数点
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Empty => None,
        }
    }

    /// 数值形式；文本按数字解析
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            CellValue::Empty => None,
        }
    }
}

/// 数值转文本：整数不带 ".0"
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::String(s) => CellValue::text(s),
            Data::Bool(b) => CellValue::Text(b.to_string()),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s),
            Data::Error(_) | Data::Empty => CellValue::Empty,
        }
    }
}

/// 第一个工作表的内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    pub headers: Vec<String>,
    /// 数据行（不含表头）；行号 = 索引 + 2
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetGrid {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { headers, rows }
    }

    /// 数据行及其 Excel 行号
    pub fn numbered_rows(&self) -> impl Iterator<Item = (usize, &[CellValue])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx + 2, row.as_slice()))
    }

    pub fn has_data(&self) -> bool {
        self.rows.iter().any(|row| row.iter().any(|c| !c.is_empty()))
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    /// 从任意 Reader 解析（首行为表头）
    pub fn parse_reader<R: std::io::Read>(&self, reader: R) -> ImportResult<SheetGrid> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{FEFF}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(CellValue::text).collect());
        }

        Ok(SheetGrid::new(headers, rows))
    }
}

impl FileParser for CsvParser {
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<SheetGrid> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }
        let file = File::open(file_path)?;
        self.parse_reader(file)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<SheetGrid> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 仅读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;
        debug!(sheet = %sheet_name, size = ?range.get_size(), "读取工作表");

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| CellValue::from(cell).as_text().unwrap_or_default())
                .collect(),
            None => return Ok(SheetGrid::default()),
        };

        let rows = rows
            .map(|row| row.iter().map(CellValue::from).collect())
            .collect();

        Ok(SheetGrid::new(headers, rows))
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_sheet(&self, file_path: &Path) -> ImportResult<SheetGrid> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.parse_sheet(file_path),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => ExcelParser.parse_sheet(file_path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}
