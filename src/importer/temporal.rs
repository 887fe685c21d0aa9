// ==========================================
// 考试排考系统 - 时间归一化
// ==========================================
// 职责: 伊朗历(Jalali) ⇄ 公历换算；多格式日期/时间解析
// 输入: "1404/10/18 از 10:30 تا 12:00"、H:MM、Excel 序列日期/时间分数、Unix 时间戳、ISO 日期
// 输出: (日期, 开始时间, 时长) 三元组，解析失败的片段置空，不报错
// ==========================================

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Jalali 历法
// ==========================================
// 33 年周期断点表（Borkowski 算法）
const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// 可换算的 Jalali 年份下界（含）
pub const MIN_JALALI_YEAR: i32 = -61;
/// 可换算的 Jalali 年份上界（不含）
pub const MAX_JALALI_YEAR: i32 = 3178;

struct JalaliCalendar {
    /// 距上一个闰年的年数（0 表示本年为闰年）
    leap: i32,
    /// 对应公历年（Jalali 年首所在年）
    gy: i32,
    /// Jalali 年首（法尔瓦丁 1 日）在公历三月的日期
    march: u32,
}

fn jal_cal(jy: i32) -> Option<JalaliCalendar> {
    if !(MIN_JALALI_YEAR..MAX_JALALI_YEAR).contains(&jy) {
        return None;
    }

    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;

    for &jm in BREAKS.iter().skip(1) {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + (jump % 33) / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += n / 33 * 8 + ((n % 33) + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(JalaliCalendar {
        leap,
        gy,
        march: u32::try_from(march).ok()?,
    })
}

/// 是否为 Jalali 闰年（第 12 月 30 天）
pub fn is_jalali_leap_year(jy: i32) -> bool {
    jal_cal(jy).map(|c| c.leap == 0).unwrap_or(false)
}

/// Jalali 月天数：1-6 月 31 天，7-11 月 30 天，12 月平年 29 / 闰年 30
pub fn jalali_month_length(jy: i32, jm: u32) -> u32 {
    match jm {
        1..=6 => 31,
        7..=11 => 30,
        12 if is_jalali_leap_year(jy) => 30,
        12 => 29,
        _ => 0,
    }
}

/// Jalali 日期
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JalaliDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl JalaliDate {
    /// 校验后构造；越界返回 None
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        if !(MIN_JALALI_YEAR..MAX_JALALI_YEAR).contains(&year) {
            return None;
        }
        if !(1..=12).contains(&month) || day == 0 || day > jalali_month_length(year, month) {
            return None;
        }
        Some(Self { year, month, day })
    }

    /// 解析 "YYYY/MM/DD"（也接受 '-' 分隔）
    pub fn parse(raw: &str) -> Option<Self> {
        let text = normalize_digits(raw.trim());
        let (year, month, day, rest) = split_date_prefix(&text, &['/', '-'])?;
        if !rest.trim().is_empty() {
            return None;
        }
        Self::new(year, month, day)
    }

    /// 换算为公历日期
    pub fn to_gregorian(&self) -> Option<NaiveDate> {
        let cal = jal_cal(self.year)?;
        let first = NaiveDate::from_ymd_opt(cal.gy, 3, cal.march)?;
        let jm = i64::from(self.month);
        let offset = (jm - 1) * 31 - (jm / 7) * (jm - 7) + i64::from(self.day) - 1;
        first.checked_add_signed(Duration::days(offset))
    }

    /// 由公历日期换算
    pub fn from_gregorian(date: NaiveDate) -> Option<Self> {
        let gy = date.year();
        let mut jy = gy - 621;
        let cal = jal_cal(jy)?;
        let first = NaiveDate::from_ymd_opt(gy, 3, cal.march)?;
        let mut k = (date - first).num_days();

        if k >= 0 {
            if k <= 185 {
                return Some(Self {
                    year: jy,
                    month: 1 + (k / 31) as u32,
                    day: (k % 31) as u32 + 1,
                });
            }
            k -= 186;
        } else {
            jy -= 1;
            k += 179;
            if cal.leap == 1 {
                k += 1;
            }
        }

        Some(Self {
            year: jy,
            month: 7 + (k / 30) as u32,
            day: (k % 30) as u32 + 1,
        })
    }
}

impl fmt::Display for JalaliDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

/// Jalali (年, 月, 日) → 公历
pub fn jalali_to_gregorian(jy: i32, jm: u32, jd: u32) -> Option<NaiveDate> {
    JalaliDate::new(jy, jm, jd)?.to_gregorian()
}

/// 公历 → Jalali
pub fn gregorian_to_jalali(date: NaiveDate) -> Option<JalaliDate> {
    JalaliDate::from_gregorian(date)
}

/// 公历日期格式化为 Jalali "YYYY/MM/DD"
pub fn format_jalali(date: NaiveDate) -> Option<String> {
    gregorian_to_jalali(date).map(|j| j.to_string())
}

// ==========================================
// 解析结果
// ==========================================

/// 归一化后的 (日期, 开始时间, 时长)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemporalParts {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
}

impl TemporalParts {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.time.is_none() && self.duration_minutes.is_none()
    }
}

/// 解析任意日期/时间文本，永不失败
///
/// # 识别顺序
/// 1. 10-13 位纯数字 → Unix 时间戳（< 10^10 为秒，否则毫秒），仅产出 UTC 日期
/// 2. Jalali 日期前缀 → 公历日期；其后若有 "از H:MM تا H:MM" 则产出开始时间与时长（跨午夜 +1440）
/// 3. ISO 日期 / 日期时间 → 原样通过
/// 4. H:MM / HH:MM:SS → 时间
/// 5. 数字：[0,1) 为 Excel 时间分数；≥1 为 Excel 序列日期（小数部分为时间）
pub fn parse_date_time(raw: &str) -> TemporalParts {
    let text = normalize_digits(raw.trim());
    let text = text.as_str();
    if text.is_empty() {
        return TemporalParts::default();
    }

    if is_epoch_literal(text) {
        return TemporalParts {
            date: epoch_to_date(text),
            ..TemporalParts::default()
        };
    }

    if let Some(parts) = parse_jalali_range(text) {
        return parts;
    }

    if let Some(date) = parse_gregorian_date(text) {
        return TemporalParts {
            date: Some(date),
            time: iso_time_suffix(text),
            duration_minutes: None,
        };
    }

    if let Some(time) = parse_time_text(text) {
        return TemporalParts {
            time: Some(time),
            ..TemporalParts::default()
        };
    }

    if let Ok(number) = text.parse::<f64>() {
        return parse_excel_number(number);
    }

    TemporalParts::default()
}

/// Excel 数值：时间分数或序列日期
pub fn parse_excel_number(number: f64) -> TemporalParts {
    if !number.is_finite() || number < 0.0 {
        return TemporalParts::default();
    }
    if number < 1.0 {
        return TemporalParts {
            time: excel_fraction_to_time(number),
            ..TemporalParts::default()
        };
    }
    let time = if number.fract() > 0.0 {
        excel_fraction_to_time(number)
    } else {
        None
    };
    TemporalParts {
        date: excel_serial_to_date(number),
        time,
        duration_minutes: None,
    }
}

// ==========================================
// 单项解析
// ==========================================

/// Jalali 日期前缀（含组合区间）解析
///
/// 日期必须以 '/' 分隔；'-' 分隔的日期一律交由 ISO 解析
fn parse_jalali_range(text: &str) -> Option<TemporalParts> {
    let (year, month, day, rest) = split_date_prefix(text, &['/'])?;

    let date = jalali_to_gregorian(year, month, day);
    let mut parts = TemporalParts {
        date,
        ..TemporalParts::default()
    };

    if let Some((start, end)) = find_time_range(rest) {
        let start_min = start.0 * 60 + start.1;
        let end_min = end.0 * 60 + end.1;
        let duration = if end_min >= start_min {
            end_min - start_min
        } else {
            end_min + 24 * 60 - start_min
        };
        parts.time = NaiveTime::from_hms_opt(start.0, start.1, 0);
        parts.duration_minutes = Some(duration).filter(|d| *d > 0);
    }

    Some(parts)
}

/// Jalali 日期列解析（"YYYY/MM/DD" 或 "YYYY-MM-DD"）
pub fn parse_jalali_date(raw: &str) -> Option<NaiveDate> {
    let text = normalize_digits(raw.trim());
    let (year, month, day, _) = split_date_prefix(&text, &['/', '-'])?;
    jalali_to_gregorian(year, month, day)
}

/// 公历 ISO 日期（YYYY-MM-DD，可带 'T'/' ' 时间后缀）
pub fn parse_gregorian_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    let head = text.get(..10)?;
    let bytes = head.as_bytes();
    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }
    match text[10..].chars().next() {
        None | Some('T') | Some(' ') => NaiveDate::parse_from_str(head, "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// 公历日期列解析
///
/// 接受 ISO（原样通过，'-' 分隔一律视为公历）、"YYYY/MM/DD"（年份 ≥ 1700
/// 视为公历，否则按 Jalali 换算）、Unix 时间戳与 Excel 序列号文本
pub fn parse_any_date(raw: &str) -> Option<NaiveDate> {
    let text = normalize_digits(raw.trim());
    if let Some(date) = parse_gregorian_date(&text) {
        return Some(date);
    }
    for separator in ['-', '/'] {
        let Some((year, month, day, rest)) = split_date_prefix(&text, &[separator]) else {
            continue;
        };
        if !rest.trim().is_empty() && !rest.starts_with([' ', 'T']) {
            return None;
        }
        return if separator == '-' || year >= 1700 {
            NaiveDate::from_ymd_opt(year, month, day)
        } else {
            jalali_to_gregorian(year, month, day)
        };
    }
    if is_epoch_literal(&text) {
        return epoch_to_date(&text);
    }
    text.parse::<f64>().ok().and_then(excel_serial_to_date)
}

fn iso_time_suffix(text: &str) -> Option<NaiveTime> {
    let rest = text.get(10..)?;
    let rest = rest.strip_prefix('T').or_else(|| rest.strip_prefix(' '))?;
    let clock: String = rest.chars().take(8).collect();
    parse_time_text(clock.trim_end_matches(|c: char| !c.is_ascii_digit()))
}

/// 解析 H:MM / HH:MM / HH:MM:SS，秒被截断
pub fn parse_time_text(raw: &str) -> Option<NaiveTime> {
    let text = raw.trim();
    let mut pieces = text.split(':');
    let hour = parse_digits(pieces.next()?, 1, 2)?;
    let minute = parse_digits(pieces.next()?, 1, 2)?;
    if let Some(second) = pieces.next() {
        parse_digits(second, 1, 2)?;
    }
    if pieces.next().is_some() {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Excel 时间分数 → 时间（小时、分钟均向下取整）
pub fn excel_fraction_to_time(value: f64) -> Option<NaiveTime> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let fraction = if value >= 1.0 { value.fract() } else { value };
    // 浮点误差补偿（远小于 1 秒）
    let total_hours = fraction * 24.0 + 1e-9;
    let hours = total_hours.floor();
    let minutes = ((total_hours - hours) * 60.0).floor();
    if hours >= 24.0 {
        return NaiveTime::from_hms_opt(23, 59, 0);
    }
    NaiveTime::from_hms_opt(hours as u32, (minutes as u32).min(59), 0)
}

/// Excel 1900 日期系统序列号 → 公历日期（纪元 1899-12-30）
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// 10-13 位纯数字
pub fn is_epoch_literal(text: &str) -> bool {
    (10..=13).contains(&text.len()) && text.bytes().all(|b| b.is_ascii_digit())
}

/// Unix 时间戳 → UTC 日期
pub fn epoch_to_date(text: &str) -> Option<NaiveDate> {
    let value: i64 = text.parse().ok()?;
    let millis = if value >= 10_000_000_000 {
        value
    } else {
        value.checked_mul(1000)?
    };
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

// ==========================================
// 词法辅助
// ==========================================

/// 波斯/阿拉伯-印度数字 → ASCII 数字
pub fn normalize_digits(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            other => other,
        })
        .collect()
}

fn parse_digits(text: &str, min: usize, max: usize) -> Option<u32> {
    if text.len() < min || text.len() > max || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// 拆分开头的 "YYYY{sep}M{sep}D"，返回剩余文本
fn split_date_prefix<'a>(text: &'a str, seps: &[char]) -> Option<(i32, u32, u32, &'a str)> {
    let year_str = text.get(..4)?;
    let year = parse_digits(year_str, 4, 4)?;
    let mut rest = &text[4..];

    let sep = rest.chars().next().filter(|c| seps.contains(c))?;
    rest = &rest[sep.len_utf8()..];
    let (month, after_month) = leading_number(rest, 2)?;
    rest = after_month.strip_prefix(sep)?;
    let (day, after_day) = leading_number(rest, 2)?;

    Some((i32::try_from(year).ok()?, month, day, after_day))
}

/// 读取开头 1..=max 位数字
fn leading_number(text: &str, max: usize) -> Option<(u32, &str)> {
    let len = text
        .bytes()
        .take(max)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if len == 0 {
        return None;
    }
    Some((text[..len].parse().ok()?, &text[len..]))
}

/// 在文本中查找 "[از] H:MM تا H:MM"
fn find_time_range(text: &str) -> Option<((u32, u32), (u32, u32))> {
    const UNTIL: &str = "تا";
    for (idx, _) in text.match_indices(UNTIL) {
        let before = text[..idx].trim_end();
        let after = text[idx + UNTIL.len()..].trim_start();
        if let (Some(start), Some(end)) = (trailing_clock(before), leading_clock(after)) {
            return Some((start, end));
        }
    }
    None
}

fn valid_clock(hour: u32, minute: u32) -> Option<(u32, u32)> {
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// 文本开头的 H:MM
fn leading_clock(text: &str) -> Option<(u32, u32)> {
    let (hour, rest) = leading_number(text, 2)?;
    let rest = rest.strip_prefix(':')?;
    let minute_str = rest.get(..2)?;
    let minute = parse_digits(minute_str, 2, 2)?;
    valid_clock(hour, minute)
}

/// 文本结尾的 H:MM
fn trailing_clock(text: &str) -> Option<(u32, u32)> {
    let bytes = text.as_bytes();
    let n = bytes.len();
    if n < 4 {
        return None;
    }
    let minute = parse_digits(text.get(n - 2..)?, 2, 2)?;
    if bytes[n - 3] != b':' {
        return None;
    }
    let head = &text[..n - 3];
    let digits = head
        .bytes()
        .rev()
        .take(2)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    let hour = head[head.len() - digits..].parse().ok()?;
    valid_clock(hour, minute)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_known_jalali_conversions() {
        assert_eq!(jalali_to_gregorian(1404, 10, 18), Some(ymd(2026, 1, 8)));
        assert_eq!(jalali_to_gregorian(1403, 1, 1), Some(ymd(2024, 3, 20)));
        assert_eq!(jalali_to_gregorian(1404, 1, 1), Some(ymd(2025, 3, 21)));
        assert_eq!(jalali_to_gregorian(1403, 12, 30), Some(ymd(2025, 3, 20)));
        assert_eq!(
            gregorian_to_jalali(ymd(2026, 1, 8)),
            JalaliDate::new(1404, 10, 18)
        );
        assert_eq!(
            gregorian_to_jalali(ymd(2024, 3, 19)),
            JalaliDate::new(1402, 12, 29)
        );
    }

    #[test]
    fn test_jalali_leap_years() {
        assert!(is_jalali_leap_year(1399));
        assert!(is_jalali_leap_year(1403));
        assert!(!is_jalali_leap_year(1404));
        assert_eq!(jalali_month_length(1403, 12), 30);
        assert_eq!(jalali_month_length(1404, 12), 29);
        assert!(JalaliDate::new(1404, 12, 30).is_none());
        assert!(JalaliDate::new(1404, 13, 1).is_none());
    }

    #[test]
    fn test_jalali_date_parse_and_display() {
        let date = JalaliDate::parse("1404-7-3").unwrap();
        assert_eq!(date.to_string(), "1404/07/03");
        assert_eq!(JalaliDate::parse("۱۴۰۴/۱۰/۱۸"), JalaliDate::new(1404, 10, 18));
        assert!(JalaliDate::parse("1404/10/18 extra").is_none());
    }

    #[test]
    fn test_combined_range() {
        let parts = parse_date_time("1404/10/18 از 10:30 تا 12:00");
        assert_eq!(parts.date, Some(ymd(2026, 1, 8)));
        assert_eq!(parts.time, Some(hm(10, 30)));
        assert_eq!(parts.duration_minutes, Some(90));
    }

    #[test]
    fn test_combined_range_flexible_spacing_and_missing_az() {
        let parts = parse_date_time("  1404/10/18 از10:30تا12:00 ");
        assert_eq!(parts.time, Some(hm(10, 30)));
        assert_eq!(parts.duration_minutes, Some(90));

        let parts = parse_date_time("1404/10/18 8:00 تا 9:15");
        assert_eq!(parts.time, Some(hm(8, 0)));
        assert_eq!(parts.duration_minutes, Some(75));
    }

    #[test]
    fn test_overnight_range() {
        let parts = parse_date_time("1404/10/18 از 23:00 تا 01:00");
        assert_eq!(parts.duration_minutes, Some(120));
    }

    #[test]
    fn test_jalali_without_range_yields_date_only() {
        let parts = parse_date_time("1404/10/18");
        assert_eq!(parts.date, Some(ymd(2026, 1, 8)));
        assert_eq!(parts.time, None);
        assert_eq!(parts.duration_minutes, None);
    }

    #[test]
    fn test_epoch_seconds_and_millis() {
        assert_eq!(parse_date_time("1767830400").date, Some(ymd(2026, 1, 8)));
        assert_eq!(parse_date_time("1767830400000").date, Some(ymd(2026, 1, 8)));
        assert_eq!(parse_date_time("1767830400").time, None);
    }

    #[test]
    fn test_epoch_boundary_is_millis() {
        assert_eq!(epoch_to_date("9999999999"), Some(ymd(2286, 11, 20)));
        assert_eq!(epoch_to_date("10000000000"), Some(ymd(1970, 4, 26)));
    }

    #[test]
    fn test_bare_time_is_zero_padded() {
        assert_eq!(parse_date_time("9:05").time, Some(hm(9, 5)));
        assert_eq!(parse_date_time("14:30:59").time, Some(hm(14, 30)));
        assert_eq!(parse_date_time("25:00"), TemporalParts::default());
    }

    #[test]
    fn test_excel_fraction_time_floors() {
        assert_eq!(excel_fraction_to_time(0.4375), Some(hm(10, 30)));
        assert_eq!(excel_fraction_to_time(0.5), Some(hm(12, 0)));
        assert_eq!(excel_fraction_to_time(8.5 / 24.0), Some(hm(8, 30)));
        assert_eq!(parse_date_time("0.75").time, Some(hm(18, 0)));
    }

    #[test]
    fn test_excel_serial_date() {
        assert_eq!(excel_serial_to_date(46030.0), Some(ymd(2026, 1, 8)));
        let parts = parse_excel_number(46030.4375);
        assert_eq!(parts.date, Some(ymd(2026, 1, 8)));
        assert_eq!(parts.time, Some(hm(10, 30)));
    }

    #[test]
    fn test_iso_date_passes_through() {
        assert_eq!(parse_date_time("2026-01-08").date, Some(ymd(2026, 1, 8)));
        let parts = parse_date_time("2026-01-08T09:15:00");
        assert_eq!(parts.time, Some(hm(9, 15)));
        assert_eq!(parse_gregorian_date("2026-1-8"), None);
    }

    #[test]
    fn test_dash_separated_jalali_column() {
        assert_eq!(parse_jalali_date("1404-10-18"), Some(ymd(2026, 1, 8)));
        assert_eq!(parse_jalali_date("1404-1-8"), Some(ymd(2025, 3, 28)));
    }

    #[test]
    fn test_dash_dates_outside_jalali_column_stay_gregorian() {
        assert_eq!(parse_date_time("1404-10-18").date, Some(ymd(1404, 10, 18)));
        assert_eq!(parse_any_date("1404-10-18"), Some(ymd(1404, 10, 18)));
        assert_eq!(parse_any_date("1404-1-8"), Some(ymd(1404, 1, 8)));
        assert_eq!(parse_any_date("1404/1/8"), Some(ymd(2025, 3, 28)));
    }

    #[test]
    fn test_any_date_disambiguates_by_year() {
        assert_eq!(parse_any_date("2026/01/08"), Some(ymd(2026, 1, 8)));
        assert_eq!(parse_any_date("1404/10/18"), Some(ymd(2026, 1, 8)));
        assert_eq!(parse_any_date("2026-01-08"), Some(ymd(2026, 1, 8)));
        assert_eq!(parse_any_date("46030"), Some(ymd(2026, 1, 8)));
        assert_eq!(parse_any_date("1404/13/01"), None);
        assert_eq!(parse_any_date("next week"), None);
    }

    #[test]
    fn test_garbage_yields_empty() {
        assert!(parse_date_time("فردا صبح").is_empty());
        assert!(parse_date_time("").is_empty());
        assert!(parse_date_time("-3").is_empty());
    }
}
