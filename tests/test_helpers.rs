// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的考场/考试/分配样例、内存仓储与临时表格文件
// ==========================================

#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use exam_board::domain::{Allocation, Exam, LegacyPlacement, Room};
use exam_board::repository::InMemoryExamBoardRepository;
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// 标准导入表头（波斯语）
pub const PERSIAN_HEADERS: &str = "عنوان,کد درس,زمان امتحان,تعداد دانشجویان,محل برگزاری";

pub fn room(id: i64, name: &str, capacity: u32) -> Room {
    Room {
        id,
        name: name.to_string(),
        capacity,
        category: None,
    }
}

pub fn exam(id: i64, term: i64, code: Option<&str>, students: Option<u32>) -> Exam {
    Exam {
        id,
        title: format!("Exam {}", id),
        course_code: code.map(str::to_string),
        term,
        owner: Some(1),
        expected_students: students,
        duration_minutes: None,
        legacy: LegacyPlacement::default(),
    }
}

/// 2026-01-08 指定时刻开始的分配
pub fn allocation(id: i64, exam: i64, room: i64, hour: u32, minute: u32, minutes: i64) -> Allocation {
    let start = Utc.with_ymd_and_hms(2026, 1, 8, hour, minute, 0).unwrap();
    Allocation {
        id,
        exam,
        room: Some(room),
        start_at: Some(start),
        end_at: Some(start + Duration::minutes(minutes)),
        allocated_seats: None,
    }
}

/// 仅含 Room A (容量 40) 与 Room B (容量 100) 的内存仓储
pub fn repo_with_rooms() -> InMemoryExamBoardRepository {
    InMemoryExamBoardRepository::new()
        .with_rooms(vec![room(1, "Room A", 40), room(2, "Room B", 100)])
}

/// 写入临时 CSV 文件
///
/// # 返回
/// - TempDir: 临时目录（需要保持存活）
/// - PathBuf: 文件路径
pub fn write_csv(header: &str, lines: &[&str]) -> Result<(TempDir, PathBuf), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("exams.csv");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "{}", header)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok((dir, path))
}
