// ==========================================
// 考试排考系统 - 考试导出
// ==========================================
// 职责: 将学期考试按有效排考信息导出为 Excel / CSV
// 规则:
//   - 每场考试一行，表头为双语标准表头（可被表头解析器回读）
//   - 日期/时间优先取分配 start_at，缺失时回退到考试冗余字段
//   - 按扩展名选择格式: .xlsx / .csv
// ==========================================

use crate::engine::schedule::{PlacementSource, RoomDirectory, ScheduleView};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::temporal::format_jalali;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument};

/// 导出工作表名
pub const EXPORT_SHEET_NAME: &str = "امتحانات";

/// 导出表头（波斯语 + 括号内英文字段名）
pub const EXPORT_HEADERS: [&str; 8] = [
    "عنوان (title)",
    "کد درس (course_code)",
    "تاریخ (میلادی) (date)",
    "تاریخ (شمسی) (date_jalali)",
    "ساعت (time)",
    "مدت (دقیقه) (duration_minutes)",
    "تعداد دانشجویان (expected_students)",
    "محل برگزاری (location)",
];

/// 导出行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub title: String,
    pub course_code: String,
    /// YYYY-MM-DD
    pub date: String,
    /// YYYY/MM/DD
    pub date_jalali: String,
    /// HH:MM
    pub time: String,
    pub duration_minutes: Option<u32>,
    pub expected_students: Option<u32>,
    pub location: String,
}

impl ExportRow {
    fn text_cells(&self) -> [String; 8] {
        [
            self.title.clone(),
            self.course_code.clone(),
            self.date.clone(),
            self.date_jalali.clone(),
            self.time.clone(),
            self.duration_minutes.map(|d| d.to_string()).unwrap_or_default(),
            self.expected_students.map(|n| n.to_string()).unwrap_or_default(),
            self.location.clone(),
        ]
    }
}

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    /// 按扩展名判定
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "xlsx" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

/// 由排考视图生成导出行（保持视图顺序）
pub fn export_rows(view: &ScheduleView, directory: &RoomDirectory) -> Vec<ExportRow> {
    view.entries()
        .iter()
        .map(|(exam, placement)| {
            // 回退到冗余字段时不填充默认时长
            let duration = if placement.source == PlacementSource::Allocation {
                Some(placement.duration_minutes)
            } else {
                exam.duration_minutes
            };
            ExportRow {
                title: exam.title.clone(),
                course_code: exam.course_code.clone().unwrap_or_default(),
                date: placement
                    .date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                date_jalali: placement.date.and_then(format_jalali).unwrap_or_default(),
                time: placement
                    .time
                    .map(|t| t.format("%H:%M").to_string())
                    .unwrap_or_default(),
                duration_minutes: duration,
                expected_students: exam.expected_students,
                location: placement.room_label(directory).unwrap_or_default(),
            }
        })
        .collect()
}

/// 写出 Excel 文件
pub fn write_xlsx(rows: &[ExportRow], path: &Path) -> ImportResult<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(EXPORT_SHEET_NAME)?;
    sheet.set_right_to_left(true);

    let header_format = Format::new().set_bold();
    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        sheet.write_string(r, 0, &row.title)?;
        sheet.write_string(r, 1, &row.course_code)?;
        sheet.write_string(r, 2, &row.date)?;
        sheet.write_string(r, 3, &row.date_jalali)?;
        sheet.write_string(r, 4, &row.time)?;
        if let Some(duration) = row.duration_minutes {
            sheet.write_number(r, 5, f64::from(duration))?;
        }
        if let Some(students) = row.expected_students {
            sheet.write_number(r, 6, f64::from(students))?;
        }
        sheet.write_string(r, 7, &row.location)?;
    }

    workbook.save(path)?;
    Ok(())
}

/// 写出 CSV 文件（UTF-8，首行表头）
pub fn write_csv(rows: &[ExportRow], path: &Path) -> ImportResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(EXPORT_HEADERS)?;
    for row in rows {
        writer.write_record(row.text_cells())?;
    }
    writer.flush()?;
    Ok(())
}

/// 按扩展名导出
///
/// # 返回
/// - 写出的行数
#[instrument(skip(view, directory), fields(path = %path.display()))]
pub fn export_schedule(
    view: &ScheduleView,
    directory: &RoomDirectory,
    path: &Path,
) -> ImportResult<usize> {
    let format = ExportFormat::from_path(path)?;
    let rows = export_rows(view, directory);
    match format {
        ExportFormat::Xlsx => write_xlsx(&rows, path)?,
        ExportFormat::Csv => write_csv(&rows, path)?,
    }
    info!(rows = rows.len(), ?format, "考试导出完成");
    Ok(rows.len())
}
