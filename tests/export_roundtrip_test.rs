// ==========================================
// 导出 → 回读 集成测试
// ==========================================
// 测试目标: 导出文件可被导入流程原样回读
// ==========================================

mod test_helpers;

use chrono::{NaiveDate, TimeZone, Utc};
use exam_board::api::ImportApi;
use exam_board::config::ConfigManager;
use exam_board::domain::{Exam, LegacyPlacement};
use exam_board::importer::{
    resolve_headers, CellValue, FileParser, SynonymTable, UniversalFileParser, EXPORT_HEADERS,
};
use test_helpers::{allocation, repo_with_rooms};

fn scheduled_exam() -> Exam {
    Exam {
        id: 10,
        title: "Calc I".to_string(),
        course_code: Some("MATH101".to_string()),
        term: 1,
        owner: Some(1),
        expected_students: Some(30),
        duration_minutes: Some(90),
        legacy: LegacyPlacement::default(),
    }
}

fn legacy_exam() -> Exam {
    Exam {
        id: 11,
        title: "Physics I".to_string(),
        course_code: Some("PHYS101".to_string()),
        term: 1,
        owner: Some(1),
        expected_students: Some(12),
        duration_minutes: None,
        legacy: LegacyPlacement {
            date: NaiveDate::from_ymd_opt(2026, 1, 9),
            time: None,
            location: Some("Room B".to_string()),
        },
    }
}

#[tokio::test]
async fn test_xlsx_export_reimports_into_new_term() {
    let source = repo_with_rooms()
        .with_exams(vec![scheduled_exam(), legacy_exam()])
        .with_allocations(vec![allocation(100, 10, 1, 10, 30, 90)]);
    let api = ImportApi::new(source, ConfigManager::new()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exams.xlsx");
    let written = api.export_exams(1, &path).await.unwrap();
    assert_eq!(written, 2);

    // 回读表头
    let grid = UniversalFileParser.parse_sheet(&path).unwrap();
    assert_eq!(grid.headers, EXPORT_HEADERS.map(str::to_string).to_vec());
    assert_eq!(grid.rows[0][3], CellValue::text("1404/10/18"));

    // 导入到另一个学期
    let target = ImportApi::new(repo_with_rooms(), ConfigManager::new()).unwrap();
    let summary = target.import_exams(&path, 2).await.unwrap();
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.failed, 0);

    let exams = target.repo().exams();
    assert_eq!(exams[0].course_code.as_deref(), Some("MATH101"));
    assert_eq!(exams[0].duration_minutes, Some(90));
    assert_eq!(exams[0].expected_students, Some(30));

    // 仅有日期无时间的考试不创建分配
    let allocations = target.repo().allocations();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].room, Some(1));
    assert_eq!(
        allocations[0].start_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 8, 10, 30, 0).unwrap())
    );
    assert_eq!(
        allocations[0].end_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap())
    );
    assert_eq!(exams[1].legacy.date, NaiveDate::from_ymd_opt(2026, 1, 9));
    assert_eq!(exams[1].legacy.location.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_csv_export_headers_resolve() {
    let source = repo_with_rooms().with_exams(vec![scheduled_exam()]);
    let api = ImportApi::new(source, ConfigManager::new()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exams.csv");
    api.export_exams(1, &path).await.unwrap();

    let grid = UniversalFileParser.parse_sheet(&path).unwrap();
    let map = resolve_headers(&grid.headers, &SynonymTable::standard()).unwrap();
    assert_eq!(map.len(), EXPORT_HEADERS.len());
    assert_eq!(grid.rows[0][0], CellValue::text("Calc I"));
}
