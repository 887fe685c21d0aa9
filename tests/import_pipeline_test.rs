// ==========================================
// 批量导入 集成测试
// ==========================================
// 测试目标: 从 CSV 文件到远端（内存仓储）的完整导入流程
// ==========================================

mod test_helpers;

use chrono::{TimeZone, Utc};
use exam_board::api::{ApiError, ImportApi};
use exam_board::config::{config_keys, ConfigManager};
use exam_board::domain::OutcomeKind;
use exam_board::engine::CollectingEventSink;
use exam_board::importer::{ExamBatchImporter, ExamImporter, ImportError};
use exam_board::logging;
use std::sync::Arc;
use test_helpers::{allocation, exam, repo_with_rooms, write_csv, PERSIAN_HEADERS};

#[tokio::test]
async fn test_calc_scenario_creates_exam_and_allocation() {
    logging::init_test();
    let (_dir, path) = write_csv(
        PERSIAN_HEADERS,
        &["Calc I,MATH101,1404/10/18 از 10:30 تا 12:00,30,Room A"],
    )
    .unwrap();

    let api = ImportApi::new(repo_with_rooms(), ConfigManager::new()).unwrap();
    let summary = api.import_exams(&path, 1).await.unwrap();

    assert_eq!(summary.imported, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.warnings, 0);
    assert_eq!(summary.created_exams[0].title, "Calc I");
    assert_eq!(summary.created_exams[0].duration_minutes, Some(90));

    let allocations = api.repo().allocations();
    assert_eq!(allocations.len(), 1);
    let booked = &allocations[0];
    assert_eq!(booked.exam, summary.created_exams[0].id);
    assert_eq!(booked.room, Some(1));
    assert_eq!(booked.allocated_seats, Some(30));
    assert_eq!(
        booked.start_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 8, 10, 30, 0).unwrap())
    );
    assert_eq!(
        booked.end_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_second_overlapping_row_reports_overlap() {
    let (_dir, path) = write_csv(
        PERSIAN_HEADERS,
        &[
            "Calc I,MATH101,1404/10/18 از 10:30 تا 12:00,30,Room A",
            "Physics I,PHYS101,1404/10/18 از 10:30 تا 11:30,8,Room A",
        ],
    )
    .unwrap();

    let api = ImportApi::new(repo_with_rooms(), ConfigManager::new()).unwrap();
    let summary = api.import_exams(&path, 1).await.unwrap();

    assert_eq!(summary.imported, 2);
    assert_eq!(summary.warnings, 1);
    let outcome = &summary.row_outcomes[0];
    assert_eq!(outcome.label, "Physics I");
    assert_eq!(outcome.kind, OutcomeKind::CreatedWithWarnings);
    let capacity = outcome.capacity.unwrap();
    assert_eq!(capacity.overlapping_count, 1);
    assert_eq!(capacity.total, 40);
    assert_eq!(capacity.used, 30);
    assert_eq!(capacity.available, 10);
}

#[tokio::test]
async fn test_prefetched_allocations_count_against_capacity() {
    let repo = repo_with_rooms()
        .with_exams(vec![exam(500, 2, Some("OTHER"), Some(35))])
        .with_allocations(vec![allocation(600, 500, 1, 11, 0, 60)]);
    let (_dir, path) = write_csv(
        PERSIAN_HEADERS,
        &["Calc I,MATH101,1404/10/18 از 10:30 تا 12:00,30,Room A"],
    )
    .unwrap();

    let api = ImportApi::new(repo, ConfigManager::new()).unwrap();
    let summary = api.import_exams(&path, 1).await.unwrap();

    // 其他学期的考试不在本学期列表中，占用人数取分配座位数（缺失为 0）
    assert_eq!(summary.imported, 1);
    let capacity = summary.row_outcomes[0].capacity.unwrap();
    assert_eq!(capacity.overlapping_count, 1);
    assert_eq!(capacity.available, 40);
}

#[tokio::test]
async fn test_duplicate_course_codes_in_one_file() {
    let (_dir, path) = write_csv(
        PERSIAN_HEADERS,
        &[
            "Calc I,MATH101,,30,",
            "Calc I (retake),MATH101,,12,",
            "Seminar,,,5,",
            "Seminar,,,5,",
        ],
    )
    .unwrap();

    let sink = Arc::new(CollectingEventSink::new());
    let api = ImportApi::new(repo_with_rooms(), ConfigManager::new())
        .unwrap()
        .with_event_sink(sink.clone());
    let summary = api.import_exams(&path, 1).await.unwrap();

    // 无课程代码的考试不参与查重
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.warnings, 1);
    assert_eq!(summary.row_outcomes[0].kind, OutcomeKind::Duplicate);
    assert_eq!(summary.row_outcomes[0].row_number, 3);
    assert!(summary.row_outcomes[0].message.contains("MATH101"));
    assert_eq!(sink.count("RowCreated"), 3);
    assert_eq!(sink.count("RowDuplicate"), 1);
    assert_eq!(sink.count("AllocationCreated"), 0);
}

#[tokio::test]
async fn test_existing_exam_in_term_is_duplicate() {
    let repo = repo_with_rooms().with_exams(vec![exam(10, 1, Some("MATH101"), Some(20))]);
    let (_dir, path) = write_csv(PERSIAN_HEADERS, &["Calc I, MATH101 ,,30,"]).unwrap();

    let api = ImportApi::new(repo, ConfigManager::new()).unwrap();
    let summary = api.import_exams(&path, 1).await.unwrap();
    assert_eq!(summary.imported, 0);
    assert_eq!(summary.warnings, 1);
    assert!(summary.row_outcomes[0].message.contains("قبلاً در این ترم ثبت شده است"));

    // 同一课程代码在其他学期不算重复
    let summary = api.import_exams(&path, 2).await.unwrap();
    assert_eq!(summary.imported, 1);
}

#[tokio::test]
async fn test_english_headers_with_separate_date_and_time() {
    let (_dir, path) = write_csv(
        "Title,Course Code,Date,Time,Duration,Students,Room",
        &[
            "Algorithms,CS201,2026-01-10,09:00,60,25,room b",
            "Databases,CS301,1404/10/20,0.375,,25,2",
        ],
    )
    .unwrap();

    let api = ImportApi::new(repo_with_rooms(), ConfigManager::new()).unwrap();
    let summary = api.import_exams(&path, 1).await.unwrap();
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.failed, 0);

    let allocations = api.repo().allocations();
    assert_eq!(allocations.len(), 2);
    assert_eq!(allocations[0].room, Some(2));
    assert_eq!(
        allocations[0].end_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 10, 10, 0, 0).unwrap())
    );
    // Jalali 日期 + Excel 小数时间，时长取默认 120 分钟
    assert_eq!(
        allocations[1].start_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap())
    );
    assert_eq!(
        allocations[1].end_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 10, 11, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_missing_title_column_fails_whole_batch() {
    let (_dir, path) = write_csv("کد درس,ساعت", &["MATH101,10:00"]).unwrap();
    let api = ImportApi::new(repo_with_rooms(), ConfigManager::new()).unwrap();

    let err = api.import_exams(&path, 1).await.unwrap_err();
    match err {
        ApiError::ImportError(message) => assert!(message.contains("کد درس")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(api.repo().exams().is_empty());
}

#[tokio::test]
async fn test_header_only_file_has_no_data() {
    let (_dir, path) = write_csv(PERSIAN_HEADERS, &[",,,,"]).unwrap();
    let importer = ExamBatchImporter::with_defaults(repo_with_rooms(), ConfigManager::new());
    let err = importer.import_file(&path, 1).await.unwrap_err();
    assert!(matches!(err, ImportError::NoDataRows));
}

#[tokio::test]
async fn test_unsupported_extension() {
    let importer = ExamBatchImporter::with_defaults(repo_with_rooms(), ConfigManager::new());
    let err = importer
        .import_file(std::path::Path::new("exams.pdf"), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn test_default_students_disabled_by_config() {
    let config = ConfigManager::new()
        .with_override(config_keys::IMPORT_DEFAULT_EXPECTED_STUDENTS, "none")
        .unwrap();
    let (_dir, path) = write_csv(
        PERSIAN_HEADERS,
        &["Calc I,MATH101,1404/10/18 از 10:30 تا 12:00,,Room A"],
    )
    .unwrap();

    let api = ImportApi::new(repo_with_rooms(), config).unwrap();
    let summary = api.import_exams(&path, 1).await.unwrap();

    // 无人数：考试照常创建，分配静默跳过
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.warnings, 0);
    assert_eq!(summary.created_exams[0].expected_students, None);
    assert!(api.repo().allocations().is_empty());
}

#[tokio::test]
async fn test_oversized_duration_is_dropped_and_batch_completes() {
    let (_dir, path) = write_csv(
        "عنوان,کد درس,تاریخ (شمسی),ساعت,مدت,تعداد دانشجویان,محل برگزاری",
        &[
            "Calc I,MATH101,1404/10/18,10:00,4294967295,10,Room A",
            "Calc II,MATH102,1404/10/18,10:00,4294967295,10,Room A",
        ],
    )
    .unwrap();

    let api = ImportApi::new(repo_with_rooms(), ConfigManager::new()).unwrap();
    let summary = api.import_exams(&path, 1).await.unwrap();

    assert_eq!(summary.imported, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.warnings, 2);
    assert!(summary.created_exams.iter().all(|e| e.duration_minutes != Some(u32::MAX)));

    let second = summary
        .row_outcomes
        .iter()
        .find(|o| o.label == "Calc II")
        .unwrap();
    assert!(second.message.contains("4294967295"));
    assert_eq!(second.capacity.unwrap().overlapping_count, 1);
    assert_eq!(api.repo().allocations().len(), 2);
}
