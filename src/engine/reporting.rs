// ==========================================
// 考试排考系统 - 排考报表
// ==========================================
// 职责: 冲突组报表、考场容量报表、考场利用率报表
// 说明: 只读消费 ScheduleView 与重叠判定，不修改任何数据
// ==========================================

use crate::domain::types::EntityId;
use crate::engine::conflict::{conflict_groups, Booking};
use crate::engine::schedule::{RoomDirectory, ScheduleView};
use crate::importer::temporal::format_jalali;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 默认学期工作日数
pub const DEFAULT_WORKING_DAYS: u32 = 80;
/// 默认每日可用小时数
pub const DEFAULT_HOURS_PER_DAY: u32 = 10;
/// 高峰时段数量
const PEAK_SLOT_COUNT: usize = 3;

/// 利用率报表参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub working_days: u32,
    pub hours_per_day: u32,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            working_days: DEFAULT_WORKING_DAYS,
            hours_per_day: DEFAULT_HOURS_PER_DAY,
        }
    }
}

impl ReportSettings {
    pub fn available_hours(&self) -> f64 {
        f64::from(self.working_days) * f64::from(self.hours_per_day)
    }
}

// ==========================================
// 冲突报表
// ==========================================

/// 冲突组内的一场考试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub exam_id: EntityId,
    pub allocation_id: Option<EntityId>,
    pub title: String,
    pub course_code: Option<String>,
    pub start: String,
    pub end: String,
    pub seats: u32,
}

/// 冲突组报表行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReportGroup {
    pub room_id: EntityId,
    pub room_name: String,
    pub date: NaiveDate,
    pub date_jalali: Option<String>,
    pub exams: Vec<ConflictEntry>,
}

fn clock(minute: u32) -> String {
    let minute = minute % (24 * 60);
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// 冲突组报表
pub fn conflict_report(view: &ScheduleView, directory: &RoomDirectory) -> Vec<ConflictReportGroup> {
    let ledger = view.ledger(directory);
    let exams: HashMap<EntityId, _> = view
        .entries()
        .iter()
        .map(|(exam, _)| (exam.id, exam))
        .collect();

    let entry = |b: &Booking| {
        let exam = exams.get(&b.exam_id);
        ConflictEntry {
            exam_id: b.exam_id,
            allocation_id: b.allocation_id,
            title: exam.map(|e| e.title.clone()).unwrap_or_default(),
            course_code: exam.and_then(|e| e.course_code.clone()),
            start: clock(b.interval.start_minute),
            end: clock(b.interval.end_minute()),
            seats: b.seats,
        }
    };

    conflict_groups(ledger.bookings())
        .into_iter()
        .map(|group| ConflictReportGroup {
            room_id: group.room_id,
            room_name: directory
                .name_of(group.room_id)
                .map(str::to_string)
                .unwrap_or_else(|| group.room_id.to_string()),
            date: group.date,
            date_jalali: format_jalali(group.date),
            exams: group.bookings.iter().map(entry).collect(),
        })
        .collect()
}

// ==========================================
// 容量报表
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityRow {
    pub exam_id: EntityId,
    pub title: String,
    pub course_code: Option<String>,
    pub room_id: Option<EntityId>,
    pub room_name: Option<String>,
    /// 人数：分配座位数优先，其次预计人数
    pub students: u32,
    pub capacity: Option<u32>,
    pub usage_percent: Option<u32>,
}

/// 考场容量报表（按使用率降序，无容量信息者置后）
pub fn capacity_report(view: &ScheduleView, directory: &RoomDirectory) -> Vec<CapacityRow> {
    let mut rows: Vec<CapacityRow> = view
        .entries()
        .iter()
        .map(|(exam, placement)| {
            let room_id = placement.room_id(directory);
            let room = room_id.and_then(|id| directory.get(id));
            let students = placement
                .allocated_seats
                .or(exam.expected_students)
                .unwrap_or(0);
            let capacity = room.map(|r| r.capacity);
            let usage_percent = capacity
                .filter(|c| *c > 0)
                .map(|c| (f64::from(students) / f64::from(c) * 100.0).round() as u32);
            CapacityRow {
                exam_id: exam.id,
                title: exam.title.clone(),
                course_code: exam.course_code.clone(),
                room_id,
                room_name: placement.room_label(directory),
                students,
                capacity,
                usage_percent,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.usage_percent
            .map(i64::from)
            .unwrap_or(-1)
            .cmp(&a.usage_percent.map(i64::from).unwrap_or(-1))
            .then(a.exam_id.cmp(&b.exam_id))
    });
    rows
}

// ==========================================
// 利用率报表
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUtilization {
    pub room_id: EntityId,
    pub room_name: String,
    pub exam_count: usize,
    pub allocated_hours: f64,
    pub usage_percent: u32,
    pub empty_hours: f64,
    /// 最繁忙的开始时段（"HH:00"），至多 3 个
    pub peak_hours: Vec<String>,
    pub exam_dates: usize,
}

/// 考场利用率报表（按使用率降序）
///
/// 已排小时按实际时长累计；可用小时 = 工作日数 × 每日小时数
pub fn utilization_report(
    view: &ScheduleView,
    directory: &RoomDirectory,
    settings: &ReportSettings,
) -> Vec<RoomUtilization> {
    let ledger = view.ledger(directory);
    let mut by_room: HashMap<EntityId, Vec<&Booking>> = HashMap::new();
    for booking in ledger.bookings() {
        by_room.entry(booking.room_id).or_default().push(booking);
    }

    let available = settings.available_hours();
    let mut report: Vec<RoomUtilization> = directory
        .rooms()
        .map(|room| {
            let bookings = by_room.get(&room.id).map(Vec::as_slice).unwrap_or(&[]);
            let allocated_minutes: u64 = bookings
                .iter()
                .map(|b| u64::from(b.interval.effective_duration()))
                .sum();
            let allocated_hours = allocated_minutes as f64 / 60.0;

            let mut slots: BTreeMap<u32, usize> = BTreeMap::new();
            for b in bookings {
                *slots.entry(b.interval.start_minute / 60).or_default() += 1;
            }
            let mut ranked: Vec<(u32, usize)> = slots.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

            let mut dates: Vec<NaiveDate> = bookings.iter().map(|b| b.interval.date).collect();
            dates.sort_unstable();
            dates.dedup();

            let usage_percent = if available > 0.0 {
                (allocated_hours / available * 100.0).round() as u32
            } else {
                0
            };

            RoomUtilization {
                room_id: room.id,
                room_name: room.name.clone(),
                exam_count: bookings.len(),
                allocated_hours,
                usage_percent,
                empty_hours: (available - allocated_hours).max(0.0),
                peak_hours: ranked
                    .into_iter()
                    .take(PEAK_SLOT_COUNT)
                    .map(|(hour, _)| format!("{:02}:00", hour))
                    .collect(),
                exam_dates: dates.len(),
            }
        })
        .collect();

    report.sort_by(|a, b| {
        b.usage_percent
            .cmp(&a.usage_percent)
            .then_with(|| a.room_name.cmp(&b.room_name))
    });
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exam::{Allocation, Exam, LegacyPlacement, Room};
    use chrono::{TimeZone, Utc};

    fn exam(id: EntityId, students: u32) -> Exam {
        Exam {
            id,
            title: format!("Exam {id}"),
            course_code: Some(format!("C{id}")),
            term: 1,
            owner: None,
            expected_students: Some(students),
            duration_minutes: None,
            legacy: LegacyPlacement::default(),
        }
    }

    fn alloc(id: EntityId, exam: EntityId, room: EntityId, h: u32, m: u32, minutes: i64) -> Allocation {
        let start = Utc.with_ymd_and_hms(2026, 1, 8, h, m, 0).unwrap();
        Allocation {
            id,
            exam,
            room: Some(room),
            start_at: Some(start),
            end_at: Some(start + chrono::Duration::minutes(minutes)),
            allocated_seats: None,
        }
    }

    fn directory() -> RoomDirectory {
        RoomDirectory::new(vec![
            Room { id: 1, name: "Room A".to_string(), capacity: 40, category: None },
            Room { id: 2, name: "Hall".to_string(), capacity: 100, category: None },
        ])
    }

    #[test]
    fn test_conflict_report_groups_overlaps() {
        let view = ScheduleView::build(
            vec![exam(1, 30), exam(2, 10), exam(3, 5)],
            &[
                alloc(11, 1, 1, 10, 30, 90),
                alloc(12, 2, 1, 11, 0, 60),
                alloc(13, 3, 2, 10, 30, 90),
            ],
        );
        let report = conflict_report(&view, &directory());
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].room_name, "Room A");
        assert_eq!(report[0].date_jalali.as_deref(), Some("1404/10/18"));
        assert_eq!(report[0].exams.len(), 2);
        assert_eq!(report[0].exams[0].start, "10:30");
        assert_eq!(report[0].exams[0].end, "12:00");
    }

    #[test]
    fn test_capacity_report_sorted_by_usage() {
        let mut a = alloc(11, 1, 1, 10, 30, 90);
        a.allocated_seats = Some(38);
        let view = ScheduleView::build(
            vec![exam(1, 30), exam(2, 50), exam(3, 5)],
            &[a, alloc(12, 2, 2, 8, 0, 60)],
        );
        let report = capacity_report(&view, &directory());
        assert_eq!(report[0].exam_id, 1);
        assert_eq!(report[0].students, 38);
        assert_eq!(report[0].usage_percent, Some(95));
        assert_eq!(report[1].usage_percent, Some(50));
        assert_eq!(report[2].usage_percent, None);
    }

    #[test]
    fn test_utilization_report_uses_actual_durations() {
        let view = ScheduleView::build(
            vec![exam(1, 30), exam(2, 10), exam(3, 5)],
            &[
                alloc(11, 1, 1, 10, 30, 90),
                alloc(12, 2, 1, 10, 0, 30),
                alloc(13, 3, 1, 14, 0, 120),
            ],
        );
        let settings = ReportSettings {
            working_days: 1,
            hours_per_day: 10,
        };
        let report = utilization_report(&view, &directory(), &settings);
        let room_a = &report[0];
        assert_eq!(room_a.room_id, 1);
        assert_eq!(room_a.exam_count, 3);
        assert!((room_a.allocated_hours - 4.0).abs() < 1e-9);
        assert_eq!(room_a.usage_percent, 40);
        assert!((room_a.empty_hours - 6.0).abs() < 1e-9);
        assert_eq!(room_a.peak_hours, vec!["10:00", "14:00"]);
        assert_eq!(report[1].exam_count, 0);
    }

    #[test]
    fn test_utilization_sum_of_huge_durations_does_not_wrap() {
        let huge = i64::from(u32::MAX);
        let view = ScheduleView::build(
            vec![exam(1, 30), exam(2, 10)],
            &[alloc(11, 1, 1, 8, 0, huge), alloc(12, 2, 1, 9, 0, huge)],
        );
        let report = utilization_report(&view, &directory(), &ReportSettings::default());
        let room_a = &report[0];
        assert_eq!(room_a.exam_count, 2);
        assert!((room_a.allocated_hours - 2.0 * huge as f64 / 60.0).abs() < 1.0);
        assert_eq!(room_a.empty_hours, 0.0);
    }
}
