use crate::model::{AdmissionRecord, EXPORT_COLUMNS};
use anyhow::{Context, Result, bail};
use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn export_path(out_dir: &Path, school_name: &str, year: i32) -> PathBuf {
    let dir_name = path_safe(school_name);
    out_dir
        .join(&dir_name)
        .join(format!("{dir_name}_{year}.csv"))
}

fn path_safe(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

pub fn export(
    records: &[AdmissionRecord],
    out_dir: &Path,
    school_name: Option<&str>,
    year: Option<i32>,
) -> Result<Option<PathBuf>> {
    let Some(first) = records.first() else {
        warn!("no records to export");
        return Ok(None);
    };

    let school_name = school_name.unwrap_or(first.school_name.as_str());
    let year = year
        .or_else(|| first.year.trim().parse::<i32>().ok())
        .unwrap_or_else(|| Utc::now().year());

    let path = export_path(out_dir, school_name, year);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export dir {}", parent.display()))?;
    }

    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        for record in records {
            writer
                .serialize(record)
                .context("failed to serialize admission record")?;
        }
        writer.flush().context("failed to flush csv writer")?;
    }

    std::fs::write(&path, buffer)
        .with_context(|| format!("failed to write export {}", path.display()))?;

    info!(
        school = %school_name,
        year,
        records = records.len(),
        file = %path.display(),
        "export written"
    );
    Ok(Some(path))
}

pub fn missing_columns(headers: &csv::StringRecord) -> Vec<&'static str> {
    EXPORT_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h.trim() == *column))
        .collect()
}

pub fn read_export(path: &Path) -> Result<Vec<AdmissionRecord>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read export {}", path.display()))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes.as_slice());

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(body);
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();
    let missing = missing_columns(&headers);
    if !missing.is_empty() {
        bail!(
            "export {} is missing columns: {}",
            path.display(),
            missing.join(", ")
        );
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<AdmissionRecord>() {
        let record = row.with_context(|| format!("malformed row in {}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}
