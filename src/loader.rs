use crate::export::read_export;
use crate::model::{AdmissionRecord, InstitutionRecord, LoadReport, NA, ScoreRow};
use crate::store::AdmissionStore;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MAX_MAJOR_LEN: usize = 224;

const UNKNOWN_MAJOR: &str = "未知";

pub fn sanitize_text(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed == NA {
        None
    } else {
        Some(collapsed)
    }
}

/// Shortens a list-style major name (`专业A、专业B、...`) at the last separator
/// that fits, closing any open full-width parenthesis with `等）`. Names with no
/// separator are cut hard. The result never exceeds `max_len` characters.
pub fn shorten_major_name(value: &str, max_len: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= max_len {
        return value.to_string();
    }

    let cut: String = chars[..max_len].iter().collect();
    if let Some(idx) = cut.rfind('、') {
        let mut base = cut[..idx]
            .trim_end_matches(['、', '，', ',', '；', ';', ' '])
            .to_string();
        if base.matches('（').count() > base.matches('）').count() {
            let keep = max_len.saturating_sub(2);
            if base.chars().count() > keep {
                base = base.chars().take(keep).collect();
            }
            base.push_str("等）");
        }
        return base;
    }

    let cut = cut.trim_end();
    if cut.matches('（').count() > cut.matches('）').count() {
        let mut base: String = cut.chars().take(max_len.saturating_sub(1)).collect();
        base.push('）');
        return base;
    }
    cut.to_string()
}

pub fn clean_code(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    if let Ok(number) = trimmed.parse::<f64>()
        && number.is_finite()
        && number >= 0.0
        && number <= f64::from(u32::MAX)
    {
        return Some(number.round() as u32);
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub fn to_int(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == NA {
        return None;
    }
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        })
}

#[derive(Debug, Deserialize)]
struct InstitutionRow {
    #[serde(alias = "全国统一招生代码", alias = "code")]
    admission_code: String,
    #[serde(alias = "大学", alias = "school")]
    name: String,
    #[serde(alias = "985", default)]
    tier_985: String,
    #[serde(alias = "211", default)]
    tier_211: String,
    #[serde(alias = "双一流", default)]
    tier_double_first_class: String,
    #[serde(alias = "省份", default)]
    province: String,
    #[serde(alias = "城市", default)]
    city: String,
}

fn flag(value: &str) -> u8 {
    let trimmed = value.trim();
    if trimmed == "是" {
        return 1;
    }
    to_int(trimmed).map_or(0, |n| u8::from(n != 0))
}

pub fn read_institutions(path: &Path) -> Result<Vec<InstitutionRecord>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read institution table {}", path.display()))?;
    let body = bytes
        .strip_prefix(b"\xEF\xBB\xBF".as_slice())
        .unwrap_or(bytes.as_slice());

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body);

    let mut out = Vec::new();
    for row in reader.deserialize::<InstitutionRow>() {
        let row = row.with_context(|| format!("malformed row in {}", path.display()))?;
        let Some(admission_code) = clean_code(&row.admission_code) else {
            warn!(name = %row.name, "institution without admission code skipped");
            continue;
        };
        out.push(InstitutionRecord {
            admission_code,
            name: row.name.trim().to_string(),
            tier_985: flag(&row.tier_985),
            tier_211: flag(&row.tier_211),
            tier_double_first_class: flag(&row.tier_double_first_class),
            province: row.province,
            city: row.city,
        });
    }

    info!(file = %path.display(), institutions = out.len(), "institution table read");
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowIssue {
    Unmatched,
    Incomplete,
}

pub fn prepare_row(
    record: &AdmissionRecord,
    valid_codes: Option<&BTreeSet<u32>>,
) -> Result<(ScoreRow, bool), RowIssue> {
    let college_code = clean_code(&record.admission_code).ok_or(RowIssue::Incomplete)?;
    if let Some(valid) = valid_codes
        && !valid.contains(&college_code)
    {
        return Err(RowIssue::Unmatched);
    }

    let admission_year = to_int(&record.year)
        .and_then(|y| i32::try_from(y).ok())
        .ok_or(RowIssue::Incomplete)?;
    let min_score = to_int(&record.min_score)
        .and_then(|s| i32::try_from(s).ok())
        .ok_or(RowIssue::Incomplete)?;

    let major = sanitize_text(&record.major).unwrap_or_else(|| UNKNOWN_MAJOR.to_string());
    let shortened = major.chars().count() > MAX_MAJOR_LEN;
    let major_name = if shortened {
        shorten_major_name(&major, MAX_MAJOR_LEN)
    } else {
        major
    };

    Ok((
        ScoreRow {
            college_code,
            subject_type: sanitize_text(&record.subject_category).unwrap_or_else(|| NA.to_string()),
            major_name,
            province: sanitize_text(&record.source_province).unwrap_or_else(|| NA.to_string()),
            admission_year,
            min_score,
            min_rank: to_int(&record.min_rank),
        },
        shortened,
    ))
}

pub fn dedup_rows(rows: Vec<ScoreRow>) -> (Vec<ScoreRow>, usize) {
    let total = rows.len();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(total);
    for row in rows {
        let key = {
            let (code, province, year, major, score, rank) = row.dedup_key();
            (code, province.to_string(), year, major.to_string(), score, rank)
        };
        if seen.insert(key) {
            kept.push(row);
        }
    }
    let removed = total - kept.len();
    (kept, removed)
}

pub fn export_files(out_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = out_dir.join("*").join("*.csv");
    let pattern = pattern.to_string_lossy();
    let mut files = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
        files.push(entry?);
    }
    files.sort();
    Ok(files)
}

pub fn load_exports(
    out_dir: &Path,
    institutions: Option<&Path>,
    store: &mut dyn AdmissionStore,
) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    if let Some(path) = institutions {
        let rows = read_institutions(path)?;
        report.institutions_upserted = store.upsert_institutions(&rows)?;
    }

    let valid = store.valid_codes();
    let filter = (!valid.is_empty()).then_some(&valid);
    if filter.is_none() {
        warn!("store has no institutions; admission codes are not checked");
    }

    let mut rows = Vec::new();
    for path in export_files(out_dir)? {
        report.files_seen += 1;
        let records = match read_export(&path) {
            Ok(records) => records,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "export skipped");
                report.files_skipped += 1;
                continue;
            }
        };

        report.rows_read += records.len();
        for record in &records {
            match prepare_row(record, filter) {
                Ok((row, shortened)) => {
                    if shortened {
                        report.majors_shortened += 1;
                    }
                    rows.push(row);
                }
                Err(RowIssue::Unmatched) => report.rows_unmatched += 1,
                Err(RowIssue::Incomplete) => report.rows_incomplete += 1,
            }
        }
    }

    let (rows, removed) = dedup_rows(rows);
    report.duplicates_removed = removed;
    report.inserted = store.insert_scores(&rows)?;

    info!(
        files = report.files_seen,
        skipped = report.files_skipped,
        read = report.rows_read,
        unmatched = report.rows_unmatched,
        incomplete = report.rows_incomplete,
        duplicates = report.duplicates_removed,
        inserted = report.inserted,
        "load complete"
    );
    Ok(report)
}
