// ==========================================
// 考试排考系统 - 考场分配冲突检查
// ==========================================
// 职责: 时间区间重叠判定、剩余容量计算、冲突组合并
// 规则:
//   - 同一公历日期且 start_a < end_b && start_b < end_a 视为重叠（半开区间）
//   - 缺少时长时 end = start + 120 分钟
//   - 剩余容量 = 考场容量 − 同考场重叠的其他考试人数之和（不报告负数）
//   - 冲突组: 同考场同日期两两重叠，经并查集合并，满足对称与传递闭包
// ==========================================

use crate::domain::exam::{Room, DEFAULT_DURATION_MINUTES};
use crate::domain::import::CapacityInfo;
use crate::domain::types::EntityId;
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// Interval - 考试时间区间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub date: NaiveDate,
    /// 开始时间（当日分钟数）
    pub start_minute: u32,
    pub duration_minutes: Option<u32>,
}

impl Interval {
    pub fn new(date: NaiveDate, start: NaiveTime, duration_minutes: Option<u32>) -> Self {
        Self {
            date,
            start_minute: start.hour() * 60 + start.minute(),
            duration_minutes,
        }
    }

    /// 有效时长（缺失时 120 分钟）
    pub fn effective_duration(&self) -> u32 {
        self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES)
    }

    /// 结束分钟（可超过 1440，跨午夜仍按开始日期比较）
    pub fn end_minute(&self) -> u32 {
        self.start_minute.saturating_add(self.effective_duration())
    }

    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.start_minute / 60, self.start_minute % 60, 0)
    }
}

/// 两区间是否重叠
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.date == b.date && a.start_minute < b.end_minute() && b.start_minute < a.end_minute()
}

// ==========================================
// Booking / BookingLedger - 考场占用台账
// ==========================================

/// 一次考场占用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub exam_id: EntityId,
    pub allocation_id: Option<EntityId>,
    pub room_id: EntityId,
    pub interval: Interval,
    /// 占用人数（考试预计人数）
    pub seats: u32,
}

/// 考场占用台账
///
/// 批量导入时先载入已有分配，再随新建分配追加，
/// 保证同一批次内后续行能看到前面行的占用
#[derive(Debug, Clone, Default)]
pub struct BookingLedger {
    bookings: Vec<Booking>,
}

impl BookingLedger {
    pub fn new(bookings: Vec<Booking>) -> Self {
        Self { bookings }
    }

    /// 追加占用
    pub fn book(&mut self, booking: Booking) {
        self.bookings.push(booking);
    }

    pub fn bookings(&self) -> &[Booking] {
        &self.bookings
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// 与候选区间在同考场重叠的其他考试占用
    pub fn overlapping<'a>(
        &'a self,
        room_id: EntityId,
        candidate: &'a Interval,
        exclude_exam: Option<EntityId>,
    ) -> impl Iterator<Item = &'a Booking> + 'a {
        self.bookings.iter().filter(move |b| {
            b.room_id == room_id
                && Some(b.exam_id) != exclude_exam
                && overlaps(&b.interval, candidate)
        })
    }

    /// 计算剩余容量
    ///
    /// # 参数
    /// - room: 目标考场
    /// - candidate: 候选区间
    /// - exclude_exam: 被排考试本身（重排时排除自身占用）
    ///
    /// # 返回
    /// - CapacityInfo { total, used, available, overlapping_count }
    pub fn available_capacity(
        &self,
        room: &Room,
        candidate: &Interval,
        exclude_exam: Option<EntityId>,
    ) -> CapacityInfo {
        let (used, overlapping_count) = self
            .overlapping(room.id, candidate, exclude_exam)
            .fold((0u32, 0usize), |(used, count), b| {
                (used.saturating_add(b.seats), count + 1)
            });

        CapacityInfo {
            total: room.capacity,
            used,
            available: room.capacity.saturating_sub(used),
            overlapping_count,
        }
    }

    /// 与指定考试冲突的其他考试（同考场同日期重叠）
    pub fn conflicts_for(&self, exam_id: EntityId) -> Vec<EntityId> {
        let mut clashing: Vec<EntityId> = self
            .bookings
            .iter()
            .filter(|own| own.exam_id == exam_id)
            .flat_map(|own| {
                self.overlapping(own.room_id, &own.interval, Some(exam_id))
                    .map(|b| b.exam_id)
                    .collect::<Vec<_>>()
            })
            .collect();
        clashing.sort_unstable();
        clashing.dedup();
        clashing
    }
}

// ==========================================
// DisjointSet - 并查集
// ==========================================
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // 路径压缩
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

// ==========================================
// 冲突组
// ==========================================

/// 冲突组：同考场同日期、两两或传递重叠的占用集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictGroup {
    pub room_id: EntityId,
    pub date: NaiveDate,
    pub bookings: Vec<Booking>,
}

impl ConflictGroup {
    pub fn exam_ids(&self) -> Vec<EntityId> {
        self.bookings.iter().map(|b| b.exam_id).collect()
    }
}

/// 计算冲突组（仅返回成员数 ≥ 2 的组）
///
/// 输出按 (考场, 日期) 排序，组内按开始时间排序
pub fn conflict_groups(bookings: &[Booking]) -> Vec<ConflictGroup> {
    let mut buckets: BTreeMap<(EntityId, NaiveDate), Vec<&Booking>> = BTreeMap::new();
    for booking in bookings {
        buckets
            .entry((booking.room_id, booking.interval.date))
            .or_default()
            .push(booking);
    }

    let mut groups = Vec::new();
    for ((room_id, date), members) in buckets {
        if members.len() < 2 {
            continue;
        }

        let mut set = DisjointSet::new(members.len());
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                if overlaps(&members[i].interval, &members[j].interval) {
                    set.union(i, j);
                }
            }
        }

        let mut by_root: BTreeMap<usize, Vec<Booking>> = BTreeMap::new();
        for (idx, booking) in members.iter().enumerate() {
            let root = set.find(idx);
            by_root.entry(root).or_default().push((*booking).clone());
        }

        let mut room_groups: Vec<ConflictGroup> = by_root
            .into_values()
            .filter(|g| g.len() > 1)
            .map(|mut g| {
                g.sort_by_key(|b| (b.interval.start_minute, b.exam_id));
                ConflictGroup {
                    room_id,
                    date,
                    bookings: g,
                }
            })
            .collect();
        room_groups.sort_by_key(|g| g.bookings.first().map(|b| b.interval.start_minute));
        groups.extend(room_groups);
    }

    groups
}
