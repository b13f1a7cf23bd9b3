//! Tabular cutoff pages.
//!
//! Cells spanning several rows are expanded into every row they cover before
//! any column is read, so a province written once beside five data rows is
//! attributed to all five.

use crate::config::TableLayout;
use crate::model::{NA, RawRecord};
use crate::normalize::{
    CATEGORY_ARTS, CATEGORY_HUMANITIES, CATEGORY_REFORMED, CATEGORY_SCIENCE, NA_PLACEHOLDERS,
    admission_type_for, canonical_batch, first_integer, infer_category,
};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("table selector must parse"));

static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("row selector must parse"));

const BATCH_KEYWORDS: [&str; 6] = ["专项", "艺术", "提前", "一批", "二批", "普通批"];

const DEFAULT_MIN_SCORE_COLUMN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub cells: Vec<String>,
    pub first_own_column: usize,
    pub first_own_colspan: usize,
}

impl GridRow {
    fn cell(&self, idx: usize) -> &str {
        self.cells.get(idx).map_or("", String::as_str)
    }

    fn leading_own_cell(&self) -> Option<&str> {
        (self.first_own_column == 0).then(|| self.cell(0))
    }
}

fn span(cell: ElementRef<'_>, attr: &str) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn expand_rows(table: ElementRef<'_>) -> Vec<GridRow> {
    // Column → (text, rows still to fill).
    let mut carried: Vec<Option<(String, usize)>> = Vec::new();
    let mut rows = Vec::new();

    for tr in table.select(&ROW) {
        let own: Vec<ElementRef<'_>> = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "td" | "th"))
            .collect();

        let mut own = own.into_iter();
        let mut cells = Vec::new();
        let mut first_own: Option<(usize, usize)> = None;

        loop {
            let col = cells.len();
            if let Some(Some((text, remaining))) = carried.get(col).cloned() {
                carried[col] = (remaining > 1).then(|| (text.clone(), remaining - 1));
                cells.push(text);
                continue;
            }

            let Some(cell) = own.next() else {
                break;
            };
            let text = cell_text(cell);
            let colspan = span(cell, "colspan");
            let rowspan = span(cell, "rowspan");
            first_own.get_or_insert((col, colspan));

            for offset in 0..colspan {
                let at = col + offset;
                if rowspan > 1 {
                    if carried.len() <= at {
                        carried.resize(at + 1, None);
                    }
                    carried[at] = Some((text.clone(), rowspan - 1));
                }
                cells.push(text.clone());
            }
        }

        if cells.is_empty() {
            continue;
        }
        let (first_own_column, first_own_colspan) = first_own.unwrap_or((cells.len(), 0));
        rows.push(GridRow {
            cells,
            first_own_column,
            first_own_colspan,
        });
    }

    rows
}

fn is_batch_label(text: &str) -> bool {
    BATCH_KEYWORDS.iter().any(|kw| text.contains(kw))
}

fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || NA_PLACEHOLDERS.contains(&trimmed)
}

fn section_batch(text: &str, default_batch: &str) -> String {
    if let Some(batch) = canonical_batch(text) {
        return batch.to_string();
    }
    let cleaned = text
        .replace("录取分数线", "")
        .replace("录取情况", "")
        .replace(['：', ':'], "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        default_batch.to_string()
    } else {
        cleaned.to_string()
    }
}

fn find_column(header: &[String], keywords: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|h| keywords.iter().any(|kw| h.contains(kw)))
}

fn parse_sectioned(rows: &[GridRow], year: i32, batch: &mut String, default_batch: &str) -> Vec<RawRecord> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let width = header.cells.len();
    let min_col = find_column(&header.cells, &["最低分"]).unwrap_or(DEFAULT_MIN_SCORE_COLUMN);
    let rank_col = find_column(&header.cells, &["位次", "排名"]);

    let mut province = String::new();
    let mut out = Vec::new();

    for row in body {
        if let Some(leading) = row.leading_own_cell() {
            let spans_table = width > 1 && row.first_own_colspan >= width;
            if spans_table || is_batch_label(leading) {
                *batch = section_batch(leading, default_batch);
                province.clear();
                debug!(batch = %batch, "table section");
                continue;
            }
        }

        let first = row.cell(0);
        if !is_placeholder(first) {
            province = first.to_string();
        }
        if province.is_empty() {
            continue;
        }

        let Some(score) = first_integer(row.cell(min_col)) else {
            continue;
        };
        let rank = rank_col.and_then(|idx| first_integer(row.cell(idx)));

        let second = row.cell(1);
        let (row_batch, major) = if is_batch_label(second) {
            (section_batch(second, default_batch), None)
        } else if is_placeholder(second) {
            (batch.clone(), None)
        } else {
            (batch.clone(), Some(second.to_string()))
        };

        let major_text = major.as_deref().unwrap_or_default();
        let mut category = infer_category(major_text);
        if category == NA && row_batch.contains("艺术") {
            category = CATEGORY_ARTS;
        }
        let admission_type = admission_type_for(&row_batch, major_text, category);

        out.push(RawRecord {
            year: Some(year.to_string()),
            province: Some(province.clone()),
            category: Some(category.to_string()),
            batch: Some(row_batch),
            major,
            score: Some(score),
            rank,
            admission_type: Some(admission_type.to_string()),
        });
    }

    out
}

fn parse_score_columns(rows: &[GridRow], year: i32, batch: &str) -> Vec<RawRecord> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let cells = &header.cells;
    let province_col = find_column(cells, &["省"]).unwrap_or(0);
    let label_col = find_column(cells, &["类别"]).unwrap_or(1);
    let score_cols = [
        (find_column(cells, &["文科", "文史"]).unwrap_or(2), CATEGORY_HUMANITIES),
        (find_column(cells, &["理科", "理工"]).unwrap_or(3), CATEGORY_SCIENCE),
        (find_column(cells, &["其它", "其他"]).unwrap_or(4), CATEGORY_REFORMED),
    ];

    let mut out = Vec::new();
    for row in body {
        let province = row.cell(province_col);
        if is_placeholder(province) {
            continue;
        }
        let label = row.cell(label_col);
        let major = (!is_placeholder(label)).then(|| label.to_string());

        for (col, category) in score_cols {
            let Some(score) = first_integer(row.cell(col)) else {
                continue;
            };
            out.push(RawRecord {
                year: Some(year.to_string()),
                province: Some(province.to_string()),
                category: Some(category.to_string()),
                batch: Some(batch.to_string()),
                major: major.clone(),
                score: Some(score),
                rank: None,
                admission_type: Some(admission_type_for(batch, label, category).to_string()),
            });
        }
    }

    out
}

pub fn parse_tables(root: ElementRef<'_>, layout: TableLayout, year: i32, default_batch: &str) -> Vec<RawRecord> {
    let mut batch = default_batch.to_string();
    let mut out = Vec::new();

    for table in root.select(&TABLE) {
        let rows = expand_rows(table);
        let parsed = match layout {
            TableLayout::Sectioned => parse_sectioned(&rows, year, &mut batch, default_batch),
            TableLayout::ScoreColumns => parse_score_columns(&rows, year, default_batch),
        };
        debug!(rows = rows.len(), records = parsed.len(), "table parsed");
        out.extend(parsed);
    }

    out
}

pub fn parse_table_html(html: &str, layout: TableLayout, year: i32, default_batch: &str) -> Vec<RawRecord> {
    let document = Html::parse_document(html);
    parse_tables(document.root_element(), layout, year, default_batch)
}
