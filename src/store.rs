use crate::model::{InstitutionRecord, ScoreRow};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

pub trait AdmissionStore {
    fn upsert_institutions(&mut self, rows: &[InstitutionRecord]) -> Result<usize>;

    fn valid_codes(&self) -> BTreeSet<u32>;

    /// Appends score rows, skipping any already present under the same
    /// deduplication key. Returns how many were inserted.
    fn insert_scores(&mut self, rows: &[ScoreRow]) -> Result<usize>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub institutions: BTreeMap<u32, InstitutionRecord>,
    #[serde(default)]
    pub scores: Vec<ScoreRow>,
}

pub fn load_state(path: &Path) -> Result<StoreState> {
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read store file {}", path.display()))?;
    let state = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse store file {}", path.display()))?;
    Ok(state)
}

pub fn save_state(path: &Path, state: &StoreState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create store directory {}", parent.display()))?;
    }

    let serialized = serde_json::to_string_pretty(state)?;
    std::fs::write(path, serialized)
        .with_context(|| format!("failed to write store file {}", path.display()))?;
    Ok(())
}

#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    state: StoreState,
}

impl JsonStore {
    pub fn open(path: &Path) -> Result<Self> {
        let state = load_state(path)?;
        info!(
            store = %path.display(),
            institutions = state.institutions.len(),
            scores = state.scores.len(),
            "store opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn save(&self) -> Result<()> {
        save_state(&self.path, &self.state)?;
        info!(store = %self.path.display(), "store written");
        Ok(())
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }
}

impl AdmissionStore for JsonStore {
    fn upsert_institutions(&mut self, rows: &[InstitutionRecord]) -> Result<usize> {
        for row in rows {
            self.state
                .institutions
                .insert(row.admission_code, row.clone());
        }
        Ok(rows.len())
    }

    fn valid_codes(&self) -> BTreeSet<u32> {
        self.state.institutions.keys().copied().collect()
    }

    fn insert_scores(&mut self, rows: &[ScoreRow]) -> Result<usize> {
        let mut existing: HashSet<_> = self
            .state
            .scores
            .iter()
            .map(|row| row.dedup_key())
            .map(|(code, province, year, major, score, rank)| {
                (code, province.to_string(), year, major.to_string(), score, rank)
            })
            .collect();

        let mut inserted = 0usize;
        for row in rows {
            let (code, province, year, major, score, rank) = row.dedup_key();
            let key = (code, province.to_string(), year, major.to_string(), score, rank);
            if existing.insert(key) {
                self.state.scores.push(row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
