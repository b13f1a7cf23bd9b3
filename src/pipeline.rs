use crate::adapters::{SourceAdapter, build_adapter};
use crate::cleaner::{TierTable, clean_batch};
use crate::config::{LoadedSchool, load_school_file, load_schools_from_dir, school_files};
use crate::export::export;
use crate::loader::load_exports;
use crate::model::{LoadReport, SchoolRunReport};
use crate::store::JsonStore;
use anyhow::{Context, Result, bail};
use chrono::{Datelike, Utc};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub config_dir: PathBuf,
    pub out_dir: PathBuf,
    pub tiers_path: Option<PathBuf>,
    pub year: Option<i32>,
    pub school: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub out_dir: PathBuf,
    pub store_path: PathBuf,
    pub institutions: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub config_dir: Option<PathBuf>,
    pub school_file: Option<PathBuf>,
}

fn select_schools(options: &CrawlOptions) -> Result<Vec<LoadedSchool>> {
    let mut schools = Vec::new();
    for path in school_files(&options.config_dir)? {
        match load_school_file(&path) {
            Ok(school) => schools.push(school),
            Err(err) => error!(
                file = %path.display(),
                error = %format!("{err:#}"),
                "school config skipped"
            ),
        }
    }
    schools.sort_by(|a, b| a.config.school.key.cmp(&b.config.school.key));

    if let Some(filter) = &options.school {
        schools.retain(|s| s.config.school.key == *filter || s.config.school.name == *filter);
    }
    if schools.is_empty() {
        bail!("no matching school configurations found");
    }
    Ok(schools)
}

pub fn run_crawl(options: &CrawlOptions) -> Result<Vec<SchoolRunReport>> {
    let schools = select_schools(options)?;
    let tiers = match &options.tiers_path {
        Some(path) => Cow::Owned(TierTable::load(path)?),
        None => Cow::Borrowed(TierTable::builtin()),
    };
    let year = options.year.unwrap_or_else(|| Utc::now().year());

    let mut reports = Vec::new();
    for school in schools {
        let key = school.config.school.key.clone();
        if !school.config.school.enabled {
            info!(school = %key, "school disabled; skipping");
            continue;
        }

        info!(school = %key, year, "crawl start");
        let result = build_adapter(&school).and_then(|mut adapter| {
            crawl_with_adapter(adapter.as_mut(), &school, year, &tiers, &options.out_dir)
        });

        match result {
            Ok(report) => reports.push(report),
            Err(err) => error!(school = %key, year, error = %format!("{err:#}"), "crawl failed"),
        }
    }

    info!(
        schools = reports.len(),
        records = reports.iter().map(|r| r.exported).sum::<usize>(),
        "crawl run complete"
    );
    Ok(reports)
}

pub fn crawl_with_adapter(
    adapter: &mut dyn SourceAdapter,
    school: &LoadedSchool,
    year: i32,
    tiers: &TierTable,
    out_dir: &Path,
) -> Result<SchoolRunReport> {
    let outcome = adapter
        .fetch(year)
        .with_context(|| format!("fetch failed for school {}", adapter.key()))?;
    let fetched = outcome.records.len();
    let cleaned = clean_batch(outcome.records, tiers);
    let output_path = export(
        &cleaned.records,
        out_dir,
        Some(school.config.school.name.as_str()),
        Some(year),
    )?;

    let report = SchoolRunReport {
        school_key: school.config.school.key.clone(),
        school_name: school.config.school.name.clone(),
        year,
        units_attempted: outcome.units_attempted,
        units_failed: outcome.units_failed,
        fetched,
        cleaned: cleaned.records.len(),
        dropped: cleaned.dropped,
        exported: if output_path.is_some() {
            cleaned.records.len()
        } else {
            0
        },
        output_path,
    };

    info!(
        school = %report.school_key,
        year,
        units = report.units_attempted,
        failed_units = report.units_failed,
        fetched = report.fetched,
        dropped = report.dropped,
        exported = report.exported,
        "school crawl summary"
    );
    Ok(report)
}

pub fn run_load(options: &LoadOptions) -> Result<LoadReport> {
    let mut store = JsonStore::open(&options.store_path)?;
    let report = load_exports(&options.out_dir, options.institutions.as_deref(), &mut store)?;
    store.save()?;
    Ok(report)
}

pub fn validate_configs(options: &ValidateOptions) -> Result<Vec<String>> {
    let mut messages = Vec::new();

    if let Some(file) = &options.school_file {
        let school = load_school_file(file)?;
        messages.push(format!(
            "OK: {} ({})",
            school.config.school.key,
            file.display()
        ));
        return Ok(messages);
    }

    if let Some(dir) = &options.config_dir {
        let schools = load_schools_from_dir(dir)?;
        for school in schools {
            messages.push(format!(
                "OK: {} ({})",
                school.config.school.key,
                school.path.display()
            ));
        }
        return Ok(messages);
    }

    bail!("either --config-dir or --school-file must be provided");
}
