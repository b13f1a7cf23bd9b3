use crate::model::{AdmissionRecord, InstitutionTags, NA};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct TierTable {
    tags: BTreeMap<String, InstitutionTags>,
}

#[derive(Debug, Deserialize)]
struct TierFile {
    #[serde(default)]
    institution: Vec<TierEntry>,
}

#[derive(Debug, Deserialize)]
struct TierEntry {
    name: String,
    #[serde(flatten)]
    tags: InstitutionTags,
}

static BUILTIN_TIERS: LazyLock<TierTable> = LazyLock::new(|| {
    let all = InstitutionTags {
        tier_985: true,
        tier_211: true,
        double_first_class: true,
    };
    let names = [
        "北京大学",
        "清华大学",
        "复旦大学",
        "上海交通大学",
        "浙江大学",
        "南京大学",
        "北京理工大学",
        "北京航空航天大学",
        "华中科技大学",
        "南开大学",
    ];
    TierTable {
        tags: names.iter().map(|n| (n.to_string(), all)).collect(),
    }
});

impl TierTable {
    pub fn builtin() -> &'static TierTable {
        &BUILTIN_TIERS
    }

    pub fn load(path: &Path) -> Result<TierTable> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tier table {}", path.display()))?;
        let file: TierFile = toml::from_str(&text)
            .with_context(|| format!("failed to parse tier table {}", path.display()))?;

        let mut table = BUILTIN_TIERS.clone();
        for entry in file.institution {
            table.tags.insert(entry.name.trim().to_string(), entry.tags);
        }
        info!(file = %path.display(), entries = table.len(), "tier table loaded");
        Ok(table)
    }

    pub fn lookup(&self, school_name: &str) -> InstitutionTags {
        self.tags.get(school_name).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

pub fn clean_score(value: &str) -> String {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        value.trim().to_string()
    } else {
        digits
    }
}

pub fn clean_rank(value: &str) -> String {
    clean_score(value)
}

fn flag(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

pub fn add_institution_tags(record: &mut AdmissionRecord, tiers: &TierTable) {
    let tags = tiers.lookup(&record.school_name);
    record.tier_985 = flag(tags.tier_985);
    record.tier_211 = flag(tags.tier_211);
    record.tier_double_first_class = flag(tags.double_first_class);
}

fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == NA
}

pub fn validate(record: &AdmissionRecord) -> Result<()> {
    for (field, value) in [
        ("year", &record.year),
        ("school", &record.school_name),
        ("source_province", &record.source_province),
    ] {
        if is_missing(value) {
            bail!("missing required field {field}");
        }
    }

    let year = record.year.trim();
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        bail!("malformed year {year:?}");
    }

    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct CleanOutcome {
    pub records: Vec<AdmissionRecord>,
    pub dropped: usize,
}

pub fn clean_batch(records: Vec<AdmissionRecord>, tiers: &TierTable) -> CleanOutcome {
    let total = records.len();
    let mut outcome = CleanOutcome::default();

    for mut record in records {
        if let Err(err) = validate(&record) {
            warn!(
                school = %record.school_name,
                province = %record.source_province,
                error = %err,
                "dropping invalid record"
            );
            outcome.dropped += 1;
            continue;
        }

        record.min_score = clean_score(&record.min_score);
        record.min_rank = clean_rank(&record.min_rank);
        add_institution_tags(&mut record, tiers);
        outcome.records.push(record);
    }

    info!(
        raw = total,
        cleaned = outcome.records.len(),
        dropped = outcome.dropped,
        "records cleaned"
    );
    outcome
}
