use crate::model::{AdmissionRecord, NA, RawRecord, SchoolIdentity};
use regex::Regex;
use std::sync::LazyLock;

/// Province names ordered longest-first so alternations built from this list
/// never let a two-character name match inside a three-character one.
pub const PROVINCES_LONGEST_FIRST: [&str; 31] = [
    "内蒙古", "黑龙江", "新疆", "西藏", "宁夏", "青海", "甘肃", "陕西", "云南", "贵州", "四川",
    "重庆", "海南", "广西", "广东", "湖南", "湖北", "河南", "山东", "江西", "福建", "安徽",
    "浙江", "江苏", "上海", "吉林", "辽宁", "河北", "山西", "天津", "北京",
];

pub const DEFAULT_PROVINCES: [&str; 31] = [
    "北京", "天津", "河北", "山西", "内蒙古", "辽宁", "吉林", "黑龙江", "上海", "江苏", "浙江",
    "安徽", "福建", "江西", "山东", "河南", "湖北", "湖南", "广东", "广西", "海南", "重庆",
    "四川", "贵州", "云南", "西藏", "陕西", "甘肃", "青海", "宁夏", "新疆",
];

pub const CATEGORY_SCIENCE: &str = "理工";
pub const CATEGORY_HUMANITIES: &str = "文史";
pub const CATEGORY_REFORMED: &str = "综合改革";
pub const CATEGORY_ARTS: &str = "艺术类";

pub const ADMISSION_GENERAL: &str = "统招";
pub const ADMISSION_NATIONAL_QUOTA: &str = "国家专项计划";
pub const ADMISSION_UNIVERSITY_QUOTA: &str = "高校专项计划";
pub const ADMISSION_TARGETED: &str = "定向生";
pub const ADMISSION_ARTS: &str = "艺术类";

pub const NA_PLACEHOLDERS: [&str; 6] = ["-", "—", "--", "/", "无", NA];

const ARTS_KEYWORDS: [&str; 5] = ["设计学", "音乐表演", "播音与主持", "舞蹈表演", "艺术"];

const ADMINISTRATIVE_SUFFIXES: [&str; 4] = ["特别行政区", "自治区", "省", "市"];
const ETHNIC_QUALIFIERS: [&str; 3] = ["维吾尔", "壮族", "回族"];

static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[（(][^）)]*[）)]").expect("parenthetical regex must compile")
});

static DECIMAL_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.\d+").expect("decimal tail regex must compile"));

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("first number regex must compile"));

pub fn normalize_province(raw: &str) -> String {
    let stripped = PARENTHETICAL.replace_all(raw, "");
    let mut name = stripped.trim();

    // An opening bracket with no partner still ends the name.
    if let Some(idx) = name.find(['（', '(']) {
        name = name[..idx].trim_end();
    }

    for suffix in ADMINISTRATIVE_SUFFIXES {
        if let Some(rest) = name.strip_suffix(suffix) {
            name = rest.trim_end();
            break;
        }
    }
    for qualifier in ETHNIC_QUALIFIERS {
        if let Some(rest) = name.strip_suffix(qualifier)
            && !rest.is_empty()
        {
            name = rest;
            break;
        }
    }

    name.to_string()
}

pub fn truncate_decimals(text: &str) -> String {
    DECIMAL_TAIL.replace_all(text, "$1").into_owned()
}

pub fn first_integer(text: &str) -> Option<String> {
    let found = FIRST_NUMBER.find(text)?;
    let value = found.as_str();
    let integer = value.split('.').next().unwrap_or(value);
    Some(integer.to_string())
}

/// Best-effort subject category guess from free text (a major name, a table
/// cell or a category label). Returns [`NA`] rather than guessing when no
/// keyword is present; it is a heuristic, not an authoritative classification.
pub fn infer_category(text: &str) -> &'static str {
    if text.contains("物理") || text.contains("物化") {
        CATEGORY_REFORMED
    } else if text.contains("历史") {
        CATEGORY_REFORMED
    } else if text.contains("理科") || text.contains("理工") {
        CATEGORY_SCIENCE
    } else if text.contains("文科") || text.contains("文史") {
        CATEGORY_HUMANITIES
    } else if ARTS_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        CATEGORY_ARTS
    } else {
        NA
    }
}

pub fn canonical_batch(text: &str) -> Option<&'static str> {
    if text.contains("国家专项") {
        Some("国家专项计划")
    } else if text.contains("高校专项") {
        Some("高校专项计划")
    } else if text.contains("专项") {
        Some("国家专项计划")
    } else if text.contains("艺术") {
        Some("艺术类")
    } else if text.contains("提前") || text.contains("定向批") {
        Some("提前批")
    } else if text.contains("一批") || text.contains("统招批") {
        Some("本科一批")
    } else if text.contains("二批") {
        Some("本科二批")
    } else if text.contains("普通批") {
        Some("普通批")
    } else {
        None
    }
}

pub fn normalize_batch(raw: &str) -> String {
    let trimmed = raw.trim();
    canonical_batch(trimmed)
        .map(str::to_string)
        .unwrap_or_else(|| trimmed.to_string())
}

pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NA {
        return NA.to_string();
    }
    if [
        CATEGORY_SCIENCE,
        CATEGORY_HUMANITIES,
        CATEGORY_REFORMED,
        CATEGORY_ARTS,
    ]
    .contains(&trimmed)
    {
        return trimmed.to_string();
    }
    match infer_category(trimmed) {
        NA => trimmed.to_string(),
        inferred => inferred.to_string(),
    }
}

pub fn normalize_admission_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed == NA
        || trimmed == ADMISSION_GENERAL
        || trimmed.starts_with("普通")
    {
        ADMISSION_GENERAL.to_string()
    } else if trimmed.contains("国家专项") {
        ADMISSION_NATIONAL_QUOTA.to_string()
    } else if trimmed.contains("高校专项") {
        ADMISSION_UNIVERSITY_QUOTA.to_string()
    } else if trimmed.contains("定向") {
        ADMISSION_TARGETED.to_string()
    } else if trimmed.contains("艺术") {
        ADMISSION_ARTS.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn admission_type_for(batch: &str, major: &str, category: &str) -> &'static str {
    if batch.contains("国家专项") {
        ADMISSION_NATIONAL_QUOTA
    } else if batch.contains("高校专项") {
        ADMISSION_UNIVERSITY_QUOTA
    } else if batch.contains("定向") || major.contains("定向") {
        ADMISSION_TARGETED
    } else if batch.contains("艺术") || category == CATEGORY_ARTS {
        ADMISSION_ARTS
    } else {
        ADMISSION_GENERAL
    }
}

pub fn na_or(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NA.to_string(),
    }
}

fn numeric_field(value: Option<&str>) -> String {
    value
        .and_then(first_integer)
        .unwrap_or_else(|| NA.to_string())
}

pub fn to_record(school: &SchoolIdentity, raw: &RawRecord) -> AdmissionRecord {
    let province = raw
        .province
        .as_deref()
        .map(normalize_province)
        .unwrap_or_default();

    AdmissionRecord {
        year: na_or(raw.year.as_deref()),
        school_name: na_or(Some(school.name.as_str())),
        tier_985: "0".to_string(),
        tier_211: "0".to_string(),
        tier_double_first_class: "0".to_string(),
        subject_category: normalize_category(raw.category.as_deref().unwrap_or_default()),
        batch: raw
            .batch
            .as_deref()
            .map(normalize_batch)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| NA.to_string()),
        major: na_or(raw.major.as_deref()),
        min_score: numeric_field(raw.score.as_deref()),
        min_rank: numeric_field(raw.rank.as_deref()),
        admission_code: na_or(Some(school.admission_code.as_str())),
        admission_type: normalize_admission_type(raw.admission_type.as_deref().unwrap_or_default()),
        source_province: na_or(Some(province.as_str())),
    }
}
