use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Explicit "value absent or unparsable" marker. Never the same as an empty
/// string.
pub const NA: &str = "NA";

pub const EXPORT_COLUMNS: [&str; 13] = [
    "year",
    "school",
    "tier_985",
    "tier_211",
    "tier_double_first_class",
    "subject_category",
    "batch",
    "major",
    "min_score",
    "min_rank",
    "admission_code",
    "admission_type",
    "source_province",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRecord {
    pub year: String,
    #[serde(rename = "school")]
    pub school_name: String,
    pub tier_985: String,
    pub tier_211: String,
    pub tier_double_first_class: String,
    pub subject_category: String,
    pub batch: String,
    pub major: String,
    pub min_score: String,
    pub min_rank: String,
    pub admission_code: String,
    pub admission_type: String,
    pub source_province: String,
}

impl AdmissionRecord {
    pub fn dedup_key(&self) -> (String, String, String, String, String, String) {
        (
            self.admission_code.clone(),
            self.source_province.clone(),
            self.year.clone(),
            self.major.clone(),
            self.min_score.clone(),
            self.min_rank.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub year: Option<String>,
    pub province: Option<String>,
    pub category: Option<String>,
    pub batch: Option<String>,
    pub major: Option<String>,
    pub score: Option<String>,
    pub rank: Option<String>,
    pub admission_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchoolIdentity {
    pub key: String,
    pub name: String,
    pub admission_code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionTags {
    #[serde(default)]
    pub tier_985: bool,
    #[serde(default)]
    pub tier_211: bool,
    #[serde(default)]
    pub double_first_class: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionRecord {
    pub admission_code: u32,
    pub name: String,
    pub tier_985: u8,
    pub tier_211: u8,
    pub tier_double_first_class: u8,
    pub province: String,
    pub city: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<AdmissionRecord>,
    pub units_attempted: usize,
    pub units_failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchoolRunReport {
    pub school_key: String,
    pub school_name: String,
    pub year: i32,
    pub units_attempted: usize,
    pub units_failed: usize,
    pub fetched: usize,
    pub cleaned: usize,
    pub dropped: usize,
    pub exported: usize,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ScoreRow {
    pub college_code: u32,
    #[serde(rename = "TYPE")]
    pub subject_type: String,
    pub major_name: String,
    pub province: String,
    pub admission_year: i32,
    pub min_score: i32,
    pub min_rank: Option<i64>,
}

impl ScoreRow {
    pub fn dedup_key(&self) -> (u32, &str, i32, &str, i32, Option<i64>) {
        (
            self.college_code,
            self.province.as_str(),
            self.admission_year,
            self.major_name.as_str(),
            self.min_score,
            self.min_rank,
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub files_seen: usize,
    pub files_skipped: usize,
    pub rows_read: usize,
    pub rows_unmatched: usize,
    pub rows_incomplete: usize,
    pub duplicates_removed: usize,
    pub majors_shortened: usize,
    pub institutions_upserted: usize,
    pub inserted: usize,
}
