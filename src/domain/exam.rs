// ==========================================
// 考试排考系统 - 排考实体
// ==========================================
// 职责: 学期 / 考场 / 考试 / 考场分配 实体与远端载荷
// 说明: 持久化由远端排考服务负责，本模块只描述线上格式
// 兼容: 外键可为数字或数字字符串；start_at/end_at 可为 ISO 字符串或 {iso, jalali}
// ==========================================

use crate::domain::types::EntityId;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 未指定时长时的默认考试时长（分钟）
pub const DEFAULT_DURATION_MINUTES: u32 = 120;

/// 单场考试时长上限（分钟）
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

// ==========================================
// Term - 学期
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    #[serde(deserialize_with = "wire::id")]
    pub id: EntityId,
    pub name: String,
    #[serde(default, deserialize_with = "wire::opt_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "wire::opt_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_archived: bool,
}

impl Term {
    /// 是否可用于活动选择（归档学期仍可查询，但不参与选择）
    pub fn is_selectable(&self) -> bool {
        !self.is_archived
    }
}

/// 过滤出可选择的学期
pub fn active_terms(terms: &[Term]) -> Vec<&Term> {
    terms.iter().filter(|t| t.is_selectable()).collect()
}

// ==========================================
// Room - 考场
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(deserialize_with = "wire::id")]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub category: Option<EntityId>,
}

// ==========================================
// Exam - 考试
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    #[serde(deserialize_with = "wire::id")]
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(deserialize_with = "wire::id")]
    pub term: EntityId,
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub owner: Option<EntityId>,
    #[serde(default)]
    pub expected_students: Option<u32>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,

    // ===== 冗余排考信息 =====
    // 仅在尚无分配时使用；读取请走 engine::schedule::resolve_placement
    #[serde(flatten)]
    pub legacy: LegacyPlacement,
}

impl Exam {
    /// 去除空白后的课程代码（空串视为无代码）
    pub fn trimmed_course_code(&self) -> Option<&str> {
        self.course_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// 考试上的冗余日期/时间/地点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyPlacement {
    #[serde(default, deserialize_with = "wire::opt_date")]
    pub date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "wire::ser_opt_hm",
        deserialize_with = "wire::opt_hm"
    )]
    pub time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "wire::opt_text")]
    pub location: Option<String>,
}

// ==========================================
// Allocation - 考场分配
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(deserialize_with = "wire::id")]
    pub id: EntityId,
    #[serde(deserialize_with = "wire::id")]
    pub exam: EntityId,
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub room: Option<EntityId>,
    #[serde(
        default,
        serialize_with = "wire::ser_opt_instant",
        deserialize_with = "wire::opt_instant"
    )]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        serialize_with = "wire::ser_opt_instant",
        deserialize_with = "wire::opt_instant"
    )]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allocated_seats: Option<u32>,
}

impl Allocation {
    /// 有效结束时间：缺失时取 start_at + 120 分钟
    pub fn effective_end(&self) -> Option<DateTime<Utc>> {
        match (self.start_at, self.end_at) {
            (_, Some(end)) => Some(end),
            (Some(start), None) => {
                Some(start + Duration::minutes(i64::from(DEFAULT_DURATION_MINUTES)))
            }
            _ => None,
        }
    }
}

// ==========================================
// 远端写入载荷
// ==========================================

/// 创建考试载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateExamPayload {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    pub term: EntityId,
    pub owner: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "wire::ser_opt_hm",
        deserialize_with = "wire::opt_hm"
    )]
    pub time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_students: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// 创建分配载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAllocationPayload {
    pub exam: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<EntityId>,
    #[serde(serialize_with = "wire::ser_instant", deserialize_with = "wire::instant")]
    pub start_at: DateTime<Utc>,
    #[serde(serialize_with = "wire::ser_instant", deserialize_with = "wire::instant")]
    pub end_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated_seats: Option<u32>,
}

impl CreateAllocationPayload {
    /// 以用户输入的墙上时间构造分配（数字原样视为 UTC，不做时区换算）
    pub fn at_wall_clock(
        exam: EntityId,
        room: EntityId,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
        seats: u32,
    ) -> Self {
        let start_at = date.and_time(time).and_utc();
        Self {
            exam,
            room: Some(room),
            start_at,
            end_at: start_at + Duration::minutes(i64::from(duration_minutes)),
            allocated_seats: Some(seats),
        }
    }
}

/// 更新分配载荷（PATCH，缺省字段保持不变）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateAllocationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<EntityId>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "wire::ser_opt_instant",
        deserialize_with = "wire::opt_instant"
    )]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "wire::ser_opt_instant",
        deserialize_with = "wire::opt_instant"
    )]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated_seats: Option<u32>,
}

// ==========================================
// 线上格式辅助 (serde with)
// ==========================================
pub(crate) mod wire {
    use super::EntityId;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Float(f64),
        Text(String),
    }

    fn id_from_repr<E: DeError>(repr: IdRepr) -> Result<EntityId, E> {
        match repr {
            IdRepr::Num(n) => Ok(n),
            IdRepr::Float(f) if f.fract() == 0.0 => Ok(f as i64),
            IdRepr::Float(f) => Err(E::custom(format!("非整数主键: {}", f))),
            IdRepr::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| E::custom(format!("非法主键: {}", s))),
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<EntityId, D::Error> {
        id_from_repr(IdRepr::deserialize(d)?)
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<EntityId>, D::Error> {
        match Option::<IdRepr>::deserialize(d)? {
            None => Ok(None),
            Some(IdRepr::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(repr) => id_from_repr(repr).map(Some),
        }
    }

    pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TextRepr {
            Num(i64),
            Text(String),
        }
        Ok(match Option::<TextRepr>::deserialize(d)? {
            None => None,
            Some(TextRepr::Num(n)) => Some(n.to_string()),
            Some(TextRepr::Text(s)) if s.trim().is_empty() => None,
            Some(TextRepr::Text(s)) => Some(s),
        })
    }

    pub fn opt_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => {
                let head = s.trim().get(..10).unwrap_or(s.trim()).to_string();
                NaiveDate::parse_from_str(&head, "%Y-%m-%d")
                    .map(Some)
                    .map_err(|e| D::Error::custom(format!("非法日期 {}: {}", s, e)))
            }
        }
    }

    /// 解析 HH:MM 或 HH:MM:SS
    pub(crate) fn parse_hm(s: &str) -> Option<NaiveTime> {
        let s = s.trim();
        NaiveTime::parse_from_str(s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
            .ok()
    }

    pub fn opt_hm<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse_hm(&s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("非法时间: {}", s))),
        }
    }

    pub fn ser_opt_hm<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum InstantRepr {
        Text(String),
        Bilingual {
            iso: String,
            #[serde(default)]
            #[allow(dead_code)]
            jalali: Option<String>,
        },
    }

    /// 解析 ISO 时间；无时区后缀时按 UTC 墙上时间处理
    pub(crate) fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    fn instant_from_repr<E: DeError>(repr: InstantRepr) -> Result<Option<DateTime<Utc>>, E> {
        let raw = match repr {
            InstantRepr::Text(s) => s,
            InstantRepr::Bilingual { iso, .. } => iso,
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        parse_instant(&raw)
            .map(Some)
            .ok_or_else(|| E::custom(format!("非法时间戳: {}", raw)))
    }

    pub fn instant<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        instant_from_repr(InstantRepr::deserialize(d)?)?
            .ok_or_else(|| D::Error::custom("时间戳为空"))
    }

    pub fn opt_instant<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<InstantRepr>::deserialize(d)? {
            None => Ok(None),
            Some(repr) => instant_from_repr(repr),
        }
    }

    pub(crate) fn format_instant(dt: &DateTime<Utc>) -> String {
        dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn ser_instant<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_instant(dt))
    }

    pub fn ser_opt_instant<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => ser_instant(dt, s),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_allocation_accepts_bilingual_start_at_and_string_ids() {
        let raw = json!({
            "id": "7",
            "exam": "12",
            "room": 3,
            "start_at": {"iso": "2026-01-08T10:30:00Z", "jalali": "1404-10-18 10:30"},
            "end_at": "2026-01-08T12:00:00+00:00",
            "allocated_seats": 30
        });
        let alloc: Allocation = serde_json::from_value(raw).unwrap();
        assert_eq!(alloc.id, 7);
        assert_eq!(alloc.exam, 12);
        assert_eq!(alloc.room, Some(3));
        assert_eq!(
            alloc.start_at.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2026-01-08 10:30"
        );
        assert_eq!(
            alloc.effective_end().unwrap().format("%H:%M").to_string(),
            "12:00"
        );
    }

    #[test]
    fn test_allocation_missing_end_defaults_to_two_hours() {
        let raw = json!({"id": 1, "exam": 2, "start_at": "2026-01-08T09:00:00Z"});
        let alloc: Allocation = serde_json::from_value(raw).unwrap();
        assert_eq!(alloc.room, None);
        assert_eq!(
            alloc.effective_end().unwrap().format("%H:%M").to_string(),
            "11:00"
        );
    }

    #[test]
    fn test_exam_legacy_fields_are_flattened() {
        let raw = json!({
            "id": 5,
            "title": "Physics",
            "course_code": " PHY1 ",
            "term": "2",
            "date": "2026-01-10",
            "time": "09:00:00",
            "location": 4
        });
        let exam: Exam = serde_json::from_value(raw).unwrap();
        assert_eq!(exam.term, 2);
        assert_eq!(exam.trimmed_course_code(), Some("PHY1"));
        assert_eq!(exam.legacy.date, NaiveDate::from_ymd_opt(2026, 1, 10));
        assert_eq!(exam.legacy.time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(exam.legacy.location.as_deref(), Some("4"));
    }

    #[test]
    fn test_create_allocation_payload_keeps_wall_clock_digits() {
        let payload = CreateAllocationPayload::at_wall_clock(
            1,
            2,
            NaiveDate::from_ymd_opt(2026, 1, 8).unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            90,
            30,
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["start_at"], "2026-01-08T10:30:00Z");
        assert_eq!(value["end_at"], "2026-01-08T12:00:00Z");
        assert_eq!(value["allocated_seats"], 30);
    }

    #[test]
    fn test_create_exam_payload_omits_absent_fields() {
        let payload = CreateExamPayload {
            title: "Calc I".to_string(),
            course_code: None,
            term: 3,
            owner: 1,
            date: None,
            time: NaiveTime::from_hms_opt(8, 5, 0),
            duration_minutes: None,
            expected_students: Some(1),
            location: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["time"], "08:05");
        assert!(value.get("course_code").is_none());
        assert!(value.get("date").is_none());
    }

    #[test]
    fn test_active_terms_excludes_archived() {
        let terms: Vec<Term> = serde_json::from_value(json!([
            {"id": 1, "name": "1403-1", "is_archived": true},
            {"id": 2, "name": "1404-1"}
        ]))
        .unwrap();
        let active = active_terms(&terms);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, 2);
    }
}
