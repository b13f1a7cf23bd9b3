use crate::export::{export, read_export};
use crate::pipeline::{CrawlOptions, run_crawl};
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub config_dir: PathBuf,
    pub out_dir: PathBuf,
    pub tiers_path: Option<PathBuf>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub schools: usize,
    pub first_run_records: usize,
    pub second_run_records: usize,
    pub dropped: usize,
    pub failed_units: usize,
    pub exports: usize,
    pub identical_exports: bool,
    pub round_trip_ok: bool,
    pub digests: BTreeMap<String, String>,
}

fn sha256_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

pub fn digest_exports(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut digests = BTreeMap::new();
    if !dir.exists() {
        return Ok(digests);
    }
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|s| s.to_str()) != Some("csv")
        {
            continue;
        }
        let relative = path.strip_prefix(dir).unwrap_or(path);
        digests.insert(relative.display().to_string(), sha256_file(path)?);
    }
    Ok(digests)
}

fn round_trips(out_dir: &Path, digests: &BTreeMap<String, String>, scratch: &Path) -> Result<bool> {
    let mut ok = true;
    for (relative, digest) in digests {
        let original = out_dir.join(relative);
        let records = read_export(&original)?;
        let Some(rewritten) = export(&records, scratch, None, None)? else {
            warn!(file = %relative, "export read back empty");
            ok = false;
            continue;
        };
        if sha256_file(&rewritten)? != *digest {
            warn!(file = %relative, "export does not survive a read/write round trip");
            ok = false;
        }
        std::fs::remove_file(&rewritten)?;
    }
    Ok(ok)
}

pub fn run_harness(options: &HarnessOptions) -> Result<HarnessReport> {
    if options.out_dir.exists() {
        std::fs::remove_dir_all(&options.out_dir)?;
    }

    let crawl = CrawlOptions {
        config_dir: options.config_dir.clone(),
        out_dir: options.out_dir.clone(),
        tiers_path: options.tiers_path.clone(),
        year: options.year,
        school: None,
    };

    let first = run_crawl(&crawl)?;
    let first_digests = digest_exports(&options.out_dir)?;

    let second = run_crawl(&crawl)?;
    let second_digests = digest_exports(&options.out_dir)?;

    let scratch = options.out_dir.with_extension("roundtrip");
    let round_trip_ok = round_trips(&options.out_dir, &second_digests, &scratch)?;
    if scratch.exists() {
        std::fs::remove_dir_all(&scratch)?;
    }

    let identical_exports = first_digests == second_digests;
    info!(
        exports = second_digests.len(),
        identical = identical_exports,
        round_trip = round_trip_ok,
        "harness complete"
    );

    Ok(HarnessReport {
        schools: first.len(),
        first_run_records: first.iter().map(|r| r.exported).sum(),
        second_run_records: second.iter().map(|r| r.exported).sum(),
        dropped: first.iter().map(|r| r.dropped).sum(),
        failed_units: first.iter().map(|r| r.units_failed).sum(),
        exports: second_digests.len(),
        identical_exports,
        round_trip_ok,
        digests: second_digests,
    })
}
