// ==========================================
// 考试排考系统 - 表头解析器
// ==========================================
// 职责: 将双语（波斯语/英语）、标点各异的表头映射到标准字段
// 规则:
//   1. 空白折叠；含 RTL 字符的表头区分大小写，其余转小写
//   2. 阿拉伯字母变体折叠（ك→ک, ي/ى→ی, ZWNJ→空格）
//   3. 精确匹配优先并短路；否则双向子串匹配（双方长度均 > 3 字符）
//   4. 同一字段先出现的列生效；每列至多绑定一个字段
//   5. 缺少 title 列为整批错误
// ==========================================

use crate::domain::types::{ExamField, HeaderLocale};
use crate::importer::error::{ImportError, ImportResult};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// 子串匹配所需的最小长度（不含）
const PARTIAL_MATCH_MIN_CHARS: usize = 3;

// ==========================================
// SynonymTable - 同义词表
// ==========================================

/// 单个同义词（已归一化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synonym {
    pub text: String,
    pub locale: HeaderLocale,
    normalized: String,
}

impl Synonym {
    pub fn new(text: impl Into<String>, locale: HeaderLocale) -> Self {
        let text = text.into();
        let normalized = normalize_header(&text);
        Self {
            text,
            locale,
            normalized,
        }
    }
}

/// 有序同义词表：标准字段 → [(同义词, 语言标签)]
///
/// 表序即子串匹配的平局裁决顺序；date_jalali 排在 date 之前
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    entries: Vec<(ExamField, Vec<Synonym>)>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置的标准同义词表
    pub fn standard() -> Self {
        use HeaderLocale::{En, Fa};
        Self::new()
            .with_field(
                ExamField::Title,
                &[("عنوان", Fa), ("نام درس", Fa), ("عنوان امتحان", Fa), ("title", En), ("exam title", En)],
            )
            .with_field(
                ExamField::CourseCode,
                &[("کد درس", Fa), ("کد", Fa), ("course_code", En), ("course code", En), ("code", En)],
            )
            .with_field(
                ExamField::ExamDateTime,
                &[("زمان امتحان", Fa), ("exam_datetime", En), ("exam datetime", En)],
            )
            .with_field(
                ExamField::DateJalali,
                &[("تاریخ (شمسی)", Fa), ("تاریخ شمسی", Fa), ("date_jalali", En), ("jalali date", En)],
            )
            .with_field(
                ExamField::Date,
                &[("تاریخ (میلادی)", Fa), ("تاریخ میلادی", Fa), ("تاریخ", Fa), ("date", En)],
            )
            .with_field(
                ExamField::Time,
                &[("ساعت", Fa), ("ساعت شروع", Fa), ("time", En), ("start time", En)],
            )
            .with_field(
                ExamField::DurationMinutes,
                &[("مدت (دقیقه)", Fa), ("مدت امتحان", Fa), ("مدت", Fa), ("duration_minutes", En), ("duration", En)],
            )
            .with_field(
                ExamField::ExpectedStudents,
                &[
                    ("تعداد دانشجویان", Fa),
                    ("تعداد ثبت نامی", Fa),
                    ("حداکثر ظرفیت", Fa),
                    ("ظرفیت", Fa),
                    ("expected_students", En),
                    ("students", En),
                ],
            )
            .with_field(
                ExamField::Location,
                &[("محل برگزاری", Fa), ("مکان", Fa), ("location", En), ("room", En)],
            )
    }

    /// 追加字段及其同义词（字段已存在时追加到末尾）
    pub fn with_field(mut self, field: ExamField, synonyms: &[(&str, HeaderLocale)]) -> Self {
        for (text, locale) in synonyms {
            self = self.with_synonym(field, *text, *locale);
        }
        self
    }

    /// 追加单个同义词
    pub fn with_synonym(
        mut self,
        field: ExamField,
        text: impl Into<String>,
        locale: HeaderLocale,
    ) -> Self {
        let synonym = Synonym::new(text, locale);
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some((_, list)) => list.push(synonym),
            None => self.entries.push((field, vec![synonym])),
        }
        self
    }

    /// 按表序遍历 (字段, 同义词)
    pub fn iter(&self) -> impl Iterator<Item = (ExamField, &Synonym)> {
        self.entries
            .iter()
            .flat_map(|(field, list)| list.iter().map(move |s| (*field, s)))
    }

    /// 字段的同义词
    pub fn synonyms(&self, field: ExamField) -> &[Synonym] {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, list)| list.as_slice())
            .unwrap_or(&[])
    }
}

// ==========================================
// HeaderMap - 字段 → 列索引
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    columns: BTreeMap<ExamField, usize>,
}

impl HeaderMap {
    pub fn get(&self, field: ExamField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: ExamField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExamField, usize)> + '_ {
        self.columns.iter().map(|(f, i)| (*f, *i))
    }

    /// 绑定字段（已绑定时保持先到者），返回是否绑定成功
    fn bind(&mut self, field: ExamField, column: usize) -> bool {
        if self.columns.contains_key(&field) {
            return false;
        }
        self.columns.insert(field, column);
        true
    }
}

impl FromIterator<(ExamField, usize)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (ExamField, usize)>>(iter: T) -> Self {
        let mut map = HeaderMap::default();
        for (field, column) in iter {
            map.bind(field, column);
        }
        map
    }
}

// ==========================================
// 归一化与解析
// ==========================================

/// 是否包含阿拉伯字母区块（U+0600–U+06FF）字符
pub fn contains_rtl(text: &str) -> bool {
    text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// 表头归一化
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .filter(|c| *c != '\u{FEFF}')
        .map(|c| match c {
            'ك' => 'ک',
            'ي' | 'ى' => 'ی',
            '\u{200C}' | '\u{00A0}' => ' ',
            other => other,
        })
        .collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    if contains_rtl(&collapsed) {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn is_partial_match(header: &str, synonym: &str) -> bool {
    char_len(header) > PARTIAL_MATCH_MIN_CHARS
        && char_len(synonym) > PARTIAL_MATCH_MIN_CHARS
        && (header.contains(synonym) || synonym.contains(header))
}

/// 将表头行解析为 字段 → 列索引
///
/// # 参数
/// - headers: 表头行原文
/// - table: 同义词表
///
/// # 返回
/// - Ok(HeaderMap): 至少包含 title
/// - Err(ImportError::MissingTitleColumn): 缺少 title 列
pub fn resolve_headers(headers: &[String], table: &SynonymTable) -> ImportResult<HeaderMap> {
    let mut map = HeaderMap::default();

    for (column, raw) in headers.iter().enumerate() {
        let header = normalize_header(raw);
        if header.is_empty() {
            continue;
        }

        // 精确匹配：整表扫描，命中即短路
        if let Some((field, _)) = table.iter().find(|(_, s)| s.normalized == header) {
            if map.bind(field, column) {
                debug!(column, header = %raw, field = %field, "表头精确匹配");
            } else {
                debug!(column, header = %raw, field = %field, "字段已绑定，忽略后续列");
            }
            continue;
        }

        // 子串匹配：仅考虑未绑定字段，取最长同义词，平局按表序
        let candidate = table
            .iter()
            .filter(|(field, s)| !map.contains(*field) && is_partial_match(&header, &s.normalized))
            .fold(None::<(ExamField, usize)>, |best, (field, s)| {
                let len = char_len(&s.normalized);
                match best {
                    Some((_, best_len)) if best_len >= len => best,
                    _ => Some((field, len)),
                }
            });

        match candidate {
            Some((field, _)) => {
                map.bind(field, column);
                debug!(column, header = %raw, field = %field, "表头子串匹配");
            }
            None => debug!(column, header = %raw, "表头未识别，忽略"),
        }
    }

    if !map.contains(ExamField::Title) {
        let available: Vec<&str> = headers
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();
        let available = if available.is_empty() {
            "(هیچ)".to_string()
        } else {
            available.join(", ")
        };
        warn!(available = %available, "缺少标题列");
        return Err(ImportError::MissingTitleColumn { available });
    }

    Ok(map)
}
