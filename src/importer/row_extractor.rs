// ==========================================
// 考试排考系统 - 行提取器
// ==========================================
// 职责: 将一行原始单元格转换为 ParsedExamRecord
// 优先级:
//   1. 组合列「زمان امتحان」解析成功时提供 日期/开始时间/时长，且其时间覆盖单独的时间列
//   2. 组合列未给出日期 → 公历日期列 → Jalali 日期列
//   3. 组合列时长优先于时长列；时长列限 1..=1440 分钟
//   4. 人数与地点始终取自各自列；地点缺失时保持为空
// 非法片段: 丢弃并在 notes 中记录（由编排器归入 warnings）
// ==========================================

use crate::domain::exam::MAX_DURATION_MINUTES;
use crate::domain::import::ParsedExamRecord;
use crate::domain::types::ExamField;
use crate::importer::file_parser::{format_number, CellValue};
use crate::importer::header_resolver::HeaderMap;
use crate::importer::importer_trait::RecordExtractor;
use crate::importer::temporal::{
    excel_fraction_to_time, is_epoch_literal, parse_any_date, parse_date_time, parse_excel_number,
    parse_jalali_date, parse_time_text, TemporalParts,
};
use chrono::NaiveTime;
use tracing::{debug, trace};

// ==========================================
// RowExtractor
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct RowExtractor;

impl RecordExtractor for RowExtractor {
    fn extract(
        &self,
        row: &[CellValue],
        row_number: usize,
        headers: &HeaderMap,
    ) -> Option<ParsedExamRecord> {
        extract_row(row, row_number, headers)
    }
}

/// 读取字段对应的非空单元格
fn field_cell<'a>(row: &'a [CellValue], headers: &HeaderMap, field: ExamField) -> Option<&'a CellValue> {
    headers
        .get(field)
        .and_then(|idx| row.get(idx))
        .filter(|cell| !cell.is_empty())
}

/// 单元格原文（用于提示信息）
fn raw_text(cell: &CellValue) -> String {
    cell.as_text().unwrap_or_default()
}

/// 提取一行；标题为空时返回 None
pub fn extract_row(
    row: &[CellValue],
    row_number: usize,
    headers: &HeaderMap,
) -> Option<ParsedExamRecord> {
    let title = field_cell(row, headers, ExamField::Title)
        .and_then(CellValue::as_text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())?;

    let mut record = ParsedExamRecord::new(row_number, title);

    record.course_code = field_cell(row, headers, ExamField::CourseCode)
        .and_then(CellValue::as_text)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    // ===== 1. 组合列 =====
    if let Some(cell) = field_cell(row, headers, ExamField::ExamDateTime) {
        let parts = parse_combined_cell(cell);
        trace!(row = row_number, ?parts, "组合时间列解析");
        if parts.is_empty() {
            record
                .notes
                .push(format!("فرمت زمان امتحان نامعتبر: {} - نادیده گرفته شد", raw_text(cell)));
        }
        record.date = parts.date;
        record.time = parts.time;
        record.duration_minutes = parts.duration_minutes;
    }

    // ===== 2. 日期回退 =====
    if record.date.is_none() {
        let mut rejected: Option<String> = None;

        if let Some(cell) = field_cell(row, headers, ExamField::Date) {
            record.date = match cell {
                CellValue::Number(n) => {
                    let literal = format_number(*n);
                    if is_epoch_literal(&literal) {
                        parse_any_date(&literal)
                    } else {
                        parse_excel_number(*n).date
                    }
                }
                CellValue::Text(s) => parse_any_date(s),
                CellValue::Empty => None,
            };
            if record.date.is_none() {
                rejected = Some(raw_text(cell));
            }
        }

        if record.date.is_none() {
            if let Some(cell) = field_cell(row, headers, ExamField::DateJalali) {
                record.date = cell.as_text().as_deref().and_then(parse_jalali_date);
                if record.date.is_none() && rejected.is_none() {
                    rejected = Some(raw_text(cell));
                }
            }
        }

        if let (None, Some(raw)) = (record.date, rejected) {
            record
                .notes
                .push(format!("فرمت تاریخ نامعتبر: {} - تاریخ حذف شد", raw));
        }
    }

    // ===== 3. 时间（组合列已给出时忽略） =====
    if record.time.is_none() {
        if let Some(cell) = field_cell(row, headers, ExamField::Time) {
            record.time = parse_time_cell(cell);
            if record.time.is_none() {
                record
                    .notes
                    .push(format!("فرمت زمان نامعتبر: {} - زمان حذف شد", raw_text(cell)));
            }
        }
    }

    // ===== 4. 时长（组合列优先） =====
    if record.duration_minutes.is_none() {
        if let Some(cell) = field_cell(row, headers, ExamField::DurationMinutes) {
            record.duration_minutes = duration_cell(cell);
            if record.duration_minutes.is_none() {
                record
                    .notes
                    .push(format!("مدت امتحان نامعتبر: {} - نادیده گرفته شد", raw_text(cell)));
            }
        }
    }

    // ===== 5. 人数与地点 =====
    record.expected_students =
        field_cell(row, headers, ExamField::ExpectedStudents).and_then(positive_whole);

    record.location = field_cell(row, headers, ExamField::Location)
        .and_then(CellValue::as_text)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    debug!(
        row = row_number,
        title = %record.title,
        course_code = ?record.course_code,
        date = ?record.date,
        time = ?record.time,
        duration = ?record.duration_minutes,
        "行提取完成"
    );

    Some(record)
}

fn parse_combined_cell(cell: &CellValue) -> TemporalParts {
    match cell {
        CellValue::Number(n) => {
            let literal = format_number(*n);
            if is_epoch_literal(&literal) {
                parse_date_time(&literal)
            } else {
                parse_excel_number(*n)
            }
        }
        CellValue::Text(s) => parse_date_time(s),
        CellValue::Empty => TemporalParts::default(),
    }
}

fn parse_time_cell(cell: &CellValue) -> Option<NaiveTime> {
    match cell {
        CellValue::Number(n) => excel_fraction_to_time(*n),
        CellValue::Text(s) => parse_time_text(s).or_else(|| {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|n| (0.0..1.0).contains(n))
                .and_then(excel_fraction_to_time)
        }),
        CellValue::Empty => None,
    }
}

/// 时长列：1..=1440 分钟，超出视为非法
fn duration_cell(cell: &CellValue) -> Option<u32> {
    positive_whole(cell).filter(|m| *m <= MAX_DURATION_MINUTES)
}

/// 正整数（小数向下取整）
fn positive_whole(cell: &CellValue) -> Option<u32> {
    cell.as_number()
        .map(f64::floor)
        .filter(|n| *n >= 1.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}
