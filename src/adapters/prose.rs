use crate::model::{NA, RawRecord};
use crate::normalize::{
    ADMISSION_NATIONAL_QUOTA, ADMISSION_TARGETED, CATEGORY_ARTS, CATEGORY_HUMANITIES,
    CATEGORY_REFORMED, CATEGORY_SCIENCE, PROVINCES_LONGEST_FIRST, admission_type_for,
    infer_category, truncate_decimals,
};
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("paragraph selector must parse"));

static STRONG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("strong, b").expect("strong selector must parse"));

static PROVINCE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"({})(?:壮族|回族|维吾尔)?(?:省|市|自治区|特别行政区)?[：:]",
        PROVINCES_LONGEST_FIRST.join("|")
    ))
    .expect("province marker regex must compile")
});

static PROVINCE_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"({})(?:壮族|回族|维吾尔)?(?:省|市|自治区|特别行政区)?[：:]\s*(\d+)\s*分",
        PROVINCES_LONGEST_FIRST.join("|")
    ))
    .expect("province score regex must compile")
});

static LABELLED_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^；;\d]+?)(\d+)\s*分").expect("labelled score regex must compile")
});

static THREE_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{3})(?:\D|$)").expect("score regex must compile"));

const LABEL_PUNCTUATION: &[char] = &['：', ':', '，', ',', '、', '；', ';', '。', ' ', '\u{3000}'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProseContext {
    pub batch: String,
    pub major_hint: String,
}

impl ProseContext {
    pub fn new(default_batch: &str) -> Self {
        Self {
            batch: default_batch.to_string(),
            major_hint: String::new(),
        }
    }
}

pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn batch_from_title(title: &str) -> Option<(String, String)> {
    let is_title = ["批次", "分数线", "统招批", "定向批"]
        .iter()
        .any(|kw| title.contains(kw));
    if !is_title {
        return None;
    }

    let clean: String = title
        .chars()
        .filter(|c| !matches!(c, '【' | '】' | '[' | ']'))
        .collect();
    let clean = clean.trim();

    let pair = if clean.contains("提前批") {
        let hint = ["理科定向", "马克思主义理论", "艺术史论"]
            .into_iter()
            .find(|h| clean.contains(h))
            .unwrap_or_default();
        ("提前批".to_string(), hint.to_string())
    } else if clean.contains("国家专项") {
        (ADMISSION_NATIONAL_QUOTA.to_string(), String::new())
    } else if clean.contains("定向批") {
        ("提前批".to_string(), ADMISSION_TARGETED.to_string())
    } else if clean.contains("本科一批") || clean.contains("一批次") || clean.contains("统招批")
    {
        ("本科一批".to_string(), String::new())
    } else if clean.contains("本科二批") || clean.contains("二批次") {
        ("本科二批".to_string(), String::new())
    } else {
        let batch = clean
            .replace("录取分数线", "")
            .replace(['：', ':'], "")
            .trim()
            .to_string();
        (batch, String::new())
    };

    Some(pair)
}

pub fn classify_item(label: &str, batch: &str) -> (String, String, String) {
    let label = label.trim();
    let (category, major) = if label.contains("理科") || label.contains("理工") {
        let major = if label.contains("定向") {
            ADMISSION_TARGETED
        } else {
            NA
        };
        (CATEGORY_SCIENCE, major.to_string())
    } else if label.contains("文科") || label.contains("文史") {
        (CATEGORY_HUMANITIES, NA.to_string())
    } else if label.contains("物化") {
        (CATEGORY_REFORMED, "物化组".to_string())
    } else if label.contains("物理") {
        (CATEGORY_REFORMED, "物理组".to_string())
    } else if label.contains("历史") {
        (CATEGORY_REFORMED, "历史组".to_string())
    } else if label.contains("不限") {
        (CATEGORY_REFORMED, "不限组".to_string())
    } else if label.contains("通用") {
        (CATEGORY_REFORMED, "通用组".to_string())
    } else if label.contains("医学") {
        (CATEGORY_REFORMED, "医学类".to_string())
    } else if label.contains("马克思主义理论") {
        (CATEGORY_REFORMED, "马克思主义理论".to_string())
    } else if label.contains("艺术史论") {
        (CATEGORY_ARTS, "艺术史论".to_string())
    } else if label.is_empty() {
        (NA, NA.to_string())
    } else {
        (infer_category(label), label.to_string())
    };

    let admission_type = admission_type_for(batch, label, category);
    (category.to_string(), major, admission_type.to_string())
}

fn record(year: i32, province: &str, label: &str, score: &str, batch: &str) -> RawRecord {
    let (category, major, admission_type) = classify_item(label, batch);
    RawRecord {
        year: Some(year.to_string()),
        province: Some(province.to_string()),
        category: Some(category),
        batch: Some(batch.to_string()),
        major: Some(major),
        score: Some(score.to_string()),
        rank: None,
        admission_type: Some(admission_type),
    }
}

fn effective_label<'a>(raw: &'a str, hint: &'a str) -> &'a str {
    let trimmed = raw.trim_matches(LABEL_PUNCTUATION);
    if trimmed.is_empty() { hint } else { trimmed }
}

fn multi_item_records(text: &str, ctx: &ProseContext, year: i32) -> Vec<RawRecord> {
    let markers: Vec<_> = PROVINCE_MARKER.captures_iter(text).collect();
    let mut out = Vec::new();

    for (idx, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(province)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let segment = &text[whole.end()..end];

        for item in LABELLED_SCORE.captures_iter(segment) {
            let label = item.get(1).map_or("", |m| m.as_str());
            let score = item.get(2).map_or("", |m| m.as_str());
            let label = effective_label(label, &ctx.major_hint);
            out.push(record(year, province.as_str(), label, score, &ctx.batch));
        }
    }

    out
}

fn single_item_records(text: &str, ctx: &ProseContext, year: i32) -> Vec<RawRecord> {
    PROVINCE_SCORE
        .captures_iter(text)
        .filter_map(|caps| {
            let province = caps.get(1)?.as_str();
            let score = caps.get(2)?.as_str();
            Some(record(year, province, &ctx.major_hint, score, &ctx.batch))
        })
        .collect()
}

/// Extracts the records of one data paragraph. The single-item form is only
/// tried when the multi-item form produced nothing for this paragraph.
pub fn parse_paragraph_text(text: &str, ctx: &ProseContext, year: i32) -> Vec<RawRecord> {
    let text = truncate_decimals(text);

    if text.contains('；') || text.contains(';') {
        let items = multi_item_records(&text, ctx, year);
        if !items.is_empty() {
            return items;
        }
    }

    single_item_records(&text, ctx, year)
}

pub fn parse_paragraphs(container: ElementRef<'_>, year: i32, default_batch: &str) -> Vec<RawRecord> {
    let mut ctx = ProseContext::new(default_batch);
    let mut out = Vec::new();

    for paragraph in container.select(&PARAGRAPH) {
        let text = element_text(paragraph);
        if text.is_empty() {
            continue;
        }

        if let Some(strong) = paragraph.select(&STRONG).next()
            && let Some((batch, hint)) = batch_from_title(&element_text(strong))
        {
            ctx.batch = if batch.is_empty() {
                default_batch.to_string()
            } else {
                batch
            };
            ctx.major_hint = hint;
            debug!(batch = %ctx.batch, hint = %ctx.major_hint, "batch title");
            continue;
        }

        out.extend(parse_paragraph_text(&text, &ctx, year));
    }

    out
}

pub fn scan_text_lines(text: &str, year: i32, batch: &str) -> Vec<RawRecord> {
    let text = truncate_decimals(text);
    let mut current: Option<&str> = None;
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(province) = PROVINCES_LONGEST_FIRST
            .iter()
            .copied()
            .find(|p| line.contains(p))
        {
            current = Some(province);
        }

        let Some(province) = current else {
            continue;
        };
        let Some(score) = THREE_DIGITS
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };

        if seen.insert((province, score.to_string())) {
            out.push(RawRecord {
                year: Some(year.to_string()),
                province: Some(province.to_string()),
                category: None,
                batch: Some(batch.to_string()),
                major: None,
                score: Some(score.to_string()),
                rank: None,
                admission_type: None,
            });
        }
    }

    out
}
