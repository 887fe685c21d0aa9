// ==========================================
// 考试排考系统 - 排考信息解析
// ==========================================
// 职责: 考试的有效 日期/时间/考场 的唯一读取入口
// 规则: 分配（start_at/end_at/room）优先，考试上的冗余字段仅作回退
// 考场: 名称 → ID 解析（先忽略大小写，再精确；纯数字视为 ID 字面量）
// ==========================================

use crate::domain::exam::{Allocation, Exam, Room, DEFAULT_DURATION_MINUTES};
use crate::domain::types::EntityId;
use crate::engine::conflict::{Booking, BookingLedger, Interval};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// RoomDirectory - 考场目录
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: HashMap<EntityId, Room>,
    by_folded_name: HashMap<String, EntityId>,
    by_exact_name: HashMap<String, EntityId>,
}

impl RoomDirectory {
    pub fn new(rooms: Vec<Room>) -> Self {
        let mut directory = Self::default();
        for room in rooms {
            let name = room.name.trim().to_string();
            if !name.is_empty() {
                directory
                    .by_folded_name
                    .entry(name.to_lowercase())
                    .or_insert(room.id);
                directory.by_exact_name.entry(name).or_insert(room.id);
            }
            directory.rooms.insert(room.id, room);
        }
        directory
    }

    pub fn get(&self, id: EntityId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// 解析考场标签为 ID
    ///
    /// # 顺序
    /// 1. 名称忽略大小写匹配
    /// 2. 名称精确匹配
    /// 3. 纯数字按 ID 字面量使用（即使目录中不存在）
    pub fn resolve(&self, label: &str) -> Option<EntityId> {
        let name = label.trim();
        if name.is_empty() {
            return None;
        }
        self.by_folded_name
            .get(&name.to_lowercase())
            .or_else(|| self.by_exact_name.get(name))
            .copied()
            .or_else(|| name.parse::<EntityId>().ok())
    }

    /// 考场显示名（未知 ID 返回 None）
    pub fn name_of(&self, id: EntityId) -> Option<&str> {
        self.rooms.get(&id).map(|r| r.name.as_str())
    }
}

// ==========================================
// Placement - 有效排考信息
// ==========================================

/// 排考信息来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementSource {
    Allocation,
    Legacy,
}

/// 考场引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomRef {
    Id(EntityId),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub exam_id: EntityId,
    pub source: PlacementSource,
    pub allocation_id: Option<EntityId>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: u32,
    pub room: Option<RoomRef>,
    /// 占用人数：预计人数优先，其次分配座位数
    pub seats: u32,
    /// 分配上登记的座位数
    pub allocated_seats: Option<u32>,
}

impl Placement {
    /// 可参与重叠判定的区间（需同时有日期与时间）
    pub fn interval(&self) -> Option<Interval> {
        Some(Interval::new(self.date?, self.time?, Some(self.duration_minutes)))
    }

    /// 考场 ID
    pub fn room_id(&self, directory: &RoomDirectory) -> Option<EntityId> {
        match self.room.as_ref()? {
            RoomRef::Id(id) => Some(*id),
            RoomRef::Label(label) => directory.resolve(label),
        }
    }

    /// 考场显示名
    pub fn room_label(&self, directory: &RoomDirectory) -> Option<String> {
        match self.room.as_ref()? {
            RoomRef::Id(id) => Some(
                directory
                    .name_of(*id)
                    .map(str::to_string)
                    .unwrap_or_else(|| id.to_string()),
            ),
            RoomRef::Label(label) => Some(
                directory
                    .resolve(label)
                    .and_then(|id| directory.name_of(id))
                    .map(str::to_string)
                    .unwrap_or_else(|| label.clone()),
            ),
        }
    }
}

/// 解析考试的有效排考信息
///
/// # 参数
/// - exam: 考试
/// - allocation: 该考试的分配（可选）
///
/// # 返回
/// - 分配带 start_at 时取分配的日期/时间/考场，时长取 end_at − start_at
/// - 否则回退到考试上的冗余字段
pub fn resolve_placement(exam: &Exam, allocation: Option<&Allocation>) -> Placement {
    let exam_duration = exam.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);

    if let Some(alloc) = allocation {
        if let Some(start) = alloc.start_at {
            let duration = alloc
                .end_at
                .map(|end| (end - start).num_minutes())
                .filter(|m| *m > 0)
                .and_then(|m| u32::try_from(m).ok())
                .unwrap_or(exam_duration);
            let room = alloc.room.map(RoomRef::Id).or_else(|| legacy_room(exam));
            return Placement {
                exam_id: exam.id,
                source: PlacementSource::Allocation,
                allocation_id: Some(alloc.id),
                date: Some(start.date_naive()),
                time: Some(start.time()),
                duration_minutes: duration,
                room,
                seats: exam
                    .expected_students
                    .or(alloc.allocated_seats)
                    .unwrap_or(0),
                allocated_seats: alloc.allocated_seats,
            };
        }
    }

    Placement {
        exam_id: exam.id,
        source: PlacementSource::Legacy,
        allocation_id: allocation.map(|a| a.id),
        date: exam.legacy.date,
        time: exam.legacy.time,
        duration_minutes: exam_duration,
        room: allocation
            .and_then(|a| a.room)
            .map(RoomRef::Id)
            .or_else(|| legacy_room(exam)),
        seats: exam
            .expected_students
            .or_else(|| allocation.and_then(|a| a.allocated_seats))
            .unwrap_or(0),
        allocated_seats: allocation.and_then(|a| a.allocated_seats),
    }
}

fn legacy_room(exam: &Exam) -> Option<RoomRef> {
    let label = exam.legacy.location.as_deref()?.trim();
    if label.is_empty() {
        return None;
    }
    Some(match label.parse::<EntityId>() {
        Ok(id) => RoomRef::Id(id),
        Err(_) => RoomRef::Label(label.to_string()),
    })
}

/// 由全部分配构建占用台账（跨学期）
///
/// 占用人数取考试预计人数，考试不在列表中时取分配座位数
pub fn allocation_ledger(exams: &[Exam], allocations: &[Allocation]) -> BookingLedger {
    let students: HashMap<EntityId, Option<u32>> = exams
        .iter()
        .map(|e| (e.id, e.expected_students))
        .collect();

    let bookings = allocations
        .iter()
        .filter_map(|alloc| {
            let start = alloc.start_at?;
            let room_id = alloc.room?;
            let duration = alloc
                .end_at
                .map(|end| (end - start).num_minutes())
                .filter(|m| *m > 0)
                .and_then(|m| u32::try_from(m).ok());
            Some(Booking {
                exam_id: alloc.exam,
                allocation_id: Some(alloc.id),
                room_id,
                interval: Interval::new(start.date_naive(), start.time(), duration),
                seats: students
                    .get(&alloc.exam)
                    .copied()
                    .flatten()
                    .or(alloc.allocated_seats)
                    .unwrap_or(0),
            })
        })
        .collect();
    BookingLedger::new(bookings)
}

// ==========================================
// ScheduleView - 学期排考视图
// ==========================================

/// 考试与分配的联结视图（每场考试取第一条分配）
#[derive(Debug, Clone)]
pub struct ScheduleView {
    entries: Vec<(Exam, Placement)>,
}

impl ScheduleView {
    pub fn build(exams: Vec<Exam>, allocations: &[Allocation]) -> Self {
        let mut by_exam: HashMap<EntityId, &Allocation> = HashMap::new();
        for alloc in allocations {
            by_exam.entry(alloc.exam).or_insert(alloc);
        }
        let entries = exams
            .into_iter()
            .map(|exam| {
                let placement = resolve_placement(&exam, by_exam.get(&exam.id).copied());
                (exam, placement)
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[(Exam, Placement)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn placement_of(&self, exam_id: EntityId) -> Option<&Placement> {
        self.entries
            .iter()
            .find(|(exam, _)| exam.id == exam_id)
            .map(|(_, p)| p)
    }

    /// 转为占用台账（仅含 考场+日期+时间 齐全的考试）
    pub fn ledger(&self, directory: &RoomDirectory) -> BookingLedger {
        let bookings = self
            .entries
            .iter()
            .filter_map(|(_, placement)| {
                Some(Booking {
                    exam_id: placement.exam_id,
                    allocation_id: placement.allocation_id,
                    room_id: placement.room_id(directory)?,
                    interval: placement.interval()?,
                    seats: placement.seats,
                })
            })
            .collect();
        BookingLedger::new(bookings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exam::LegacyPlacement;
    use chrono::TimeZone;
    use chrono::Utc;

    fn exam(id: EntityId, legacy: LegacyPlacement) -> Exam {
        Exam {
            id,
            title: format!("Exam {id}"),
            course_code: None,
            term: 1,
            owner: Some(1),
            expected_students: Some(30),
            duration_minutes: Some(90),
            legacy,
        }
    }

    fn rooms() -> RoomDirectory {
        RoomDirectory::new(vec![
            Room { id: 1, name: "Room A".to_string(), capacity: 40, category: None },
            Room { id: 2, name: "Hall".to_string(), capacity: 100, category: None },
        ])
    }

    #[test]
    fn test_room_resolution_order() {
        let dir = rooms();
        assert_eq!(dir.resolve(" room a "), Some(1));
        assert_eq!(dir.resolve("Hall"), Some(2));
        assert_eq!(dir.resolve("17"), Some(17));
        assert_eq!(dir.resolve("Lab"), None);
        assert_eq!(dir.resolve(""), None);
    }

    #[test]
    fn test_allocation_wins_over_legacy_fields() {
        let legacy = LegacyPlacement {
            date: NaiveDate::from_ymd_opt(2026, 1, 1),
            time: NaiveTime::from_hms_opt(8, 0, 0),
            location: Some("Hall".to_string()),
        };
        let alloc = Allocation {
            id: 10,
            exam: 1,
            room: Some(1),
            start_at: Some(Utc.with_ymd_and_hms(2026, 1, 8, 10, 30, 0).unwrap()),
            end_at: Some(Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap()),
            allocated_seats: Some(30),
        };
        let placement = resolve_placement(&exam(1, legacy), Some(&alloc));
        assert_eq!(placement.source, PlacementSource::Allocation);
        assert_eq!(placement.date, NaiveDate::from_ymd_opt(2026, 1, 8));
        assert_eq!(placement.time, NaiveTime::from_hms_opt(10, 30, 0));
        assert_eq!(placement.duration_minutes, 90);
        assert_eq!(placement.room, Some(RoomRef::Id(1)));
    }

    #[test]
    fn test_legacy_fallback_without_allocation() {
        let legacy = LegacyPlacement {
            date: NaiveDate::from_ymd_opt(2026, 1, 1),
            time: NaiveTime::from_hms_opt(8, 0, 0),
            location: Some("hall".to_string()),
        };
        let placement = resolve_placement(&exam(2, legacy), None);
        assert_eq!(placement.source, PlacementSource::Legacy);
        assert_eq!(placement.room_id(&rooms()), Some(2));
        assert_eq!(placement.room_label(&rooms()).as_deref(), Some("Hall"));
    }

    #[test]
    fn test_allocation_ledger_spans_unknown_exams() {
        let start = Utc.with_ymd_and_hms(2026, 1, 8, 10, 30, 0).unwrap();
        let allocations = vec![
            Allocation {
                id: 10,
                exam: 1,
                room: Some(1),
                start_at: Some(start),
                end_at: None,
                allocated_seats: Some(5),
            },
            Allocation {
                id: 11,
                exam: 99,
                room: Some(1),
                start_at: Some(start),
                end_at: Some(start + chrono::Duration::minutes(45)),
                allocated_seats: Some(12),
            },
            Allocation {
                id: 12,
                exam: 2,
                room: None,
                start_at: Some(start),
                end_at: None,
                allocated_seats: None,
            },
        ];
        let ledger = allocation_ledger(&[exam(1, LegacyPlacement::default())], &allocations);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.bookings()[0].seats, 30);
        assert_eq!(ledger.bookings()[0].interval.effective_duration(), 120);
        assert_eq!(ledger.bookings()[1].seats, 12);
        assert_eq!(ledger.bookings()[1].interval.effective_duration(), 45);
    }

    #[test]
    fn test_ledger_skips_incomplete_placements() {
        let placed = LegacyPlacement {
            date: NaiveDate::from_ymd_opt(2026, 1, 1),
            time: NaiveTime::from_hms_opt(8, 0, 0),
            location: Some("1".to_string()),
        };
        let unplaced = LegacyPlacement::default();
        let view = ScheduleView::build(vec![exam(1, placed), exam(2, unplaced)], &[]);
        let ledger = view.ledger(&rooms());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.bookings()[0].room_id, 1);
        assert_eq!(ledger.bookings()[0].seats, 30);
    }
}
