use crate::model::SchoolIdentity;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LoadedSchool {
    pub path: PathBuf,
    pub config: SchoolConfig,
}

impl LoadedSchool {
    pub fn identity(&self) -> SchoolIdentity {
        SchoolIdentity {
            key: self.config.school.key.clone(),
            name: self.config.school.name.clone(),
            admission_code: self.config.school.admission_code.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchoolConfig {
    pub school: SchoolMeta,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub html: HtmlConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

impl SchoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.school.key.trim().is_empty() {
            bail!("school.key must not be empty");
        }
        if self.school.name.trim().is_empty() {
            bail!("school.name must not be empty");
        }
        let code = self.school.admission_code.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            bail!("school.admission_code must be a non-empty digit string");
        }

        if self.fetch.mode == FetchMode::File && self.fetch.fixture_dir.is_none() {
            bail!("fetch.fixture_dir is required for file mode");
        }

        match self.adapter.kind {
            AdapterKind::Api => {
                let api = self
                    .api
                    .as_ref()
                    .ok_or_else(|| anyhow!("[api] section is required for api adapters"))?;
                if api.base_url.trim().is_empty() {
                    bail!("api.base_url must not be empty");
                }
                if api.csrf && api.entry_url.is_none() {
                    bail!("api.entry_url is required when api.csrf is enabled");
                }
            }
            AdapterKind::Table | AdapterKind::Prose => {
                if self.html.list_url.is_none() && self.html.year_url_template.is_none() {
                    bail!("html.list_url or html.year_url_template is required for html adapters");
                }
                if let Some(template) = &self.html.year_url_template
                    && !template.contains("{year}")
                {
                    bail!("html.year_url_template must contain {{year}}");
                }
            }
        }

        Ok(())
    }

    pub fn request_delay_ms(&self) -> u64 {
        self.fetch
            .request_delay_ms
            .unwrap_or(match self.adapter.kind {
                AdapterKind::Api => 500,
                AdapterKind::Table | AdapterKind::Prose => 1000,
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchoolMeta {
    pub key: String,
    pub name: String,
    pub admission_code: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Http,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub mode: FetchMode,
    #[serde(default)]
    pub fixture_dir: Option<PathBuf>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u8,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Http,
            fixture_dir: None,
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_delay_ms: None,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Api,
    Table,
    Prose,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub kind: AdapterKind,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    #[default]
    Sectioned,
    ScoreColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlConfig {
    #[serde(default)]
    pub list_url: Option<String>,
    #[serde(default)]
    pub year_url_template: Option<String>,
    #[serde(default = "default_content_selector")]
    pub content_selector: String,
    #[serde(default)]
    pub default_batch: Option<String>,
    #[serde(default)]
    pub table_layout: TableLayout,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            list_url: None,
            year_url_template: None,
            content_selector: default_content_selector(),
            default_batch: None,
            table_layout: TableLayout::Sectioned,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub entry_url: Option<String>,
    #[serde(default = "default_param_path")]
    pub param_path: String,
    #[serde(default = "default_data_path")]
    pub data_path: String,
    #[serde(default)]
    pub csrf: bool,
    #[serde(default)]
    pub timestamp: bool,
    #[serde(default)]
    pub provinces: Vec<String>,
}

pub fn school_files(config_dir: &Path) -> Result<Vec<PathBuf>> {
    if !config_dir.exists() {
        bail!("config dir does not exist: {}", config_dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(config_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("toml") {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

pub fn load_schools_from_dir(config_dir: &Path) -> Result<Vec<LoadedSchool>> {
    let mut loaded = Vec::new();
    for path in school_files(config_dir)? {
        loaded.push(load_school_file(&path)?);
    }

    loaded.sort_by(|a, b| a.config.school.key.cmp(&b.config.school.key));
    Ok(loaded)
}

pub fn load_school_file(config_path: &Path) -> Result<LoadedSchool> {
    let text = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read school config: {}", config_path.display()))?;
    let config: SchoolConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse toml in {}", config_path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid school config {}", config_path.display()))?;
    Ok(LoadedSchool {
        path: config_path.to_path_buf(),
        config,
    })
}

pub fn resolve_path(base_config_path: &Path, maybe_relative: &Path) -> Result<PathBuf> {
    if maybe_relative.is_absolute() {
        return Ok(maybe_relative.to_path_buf());
    }

    let parent = base_config_path.parent().ok_or_else(|| {
        anyhow!(
            "school config has no parent directory: {}",
            base_config_path.display()
        )
    })?;

    Ok(parent.join(maybe_relative))
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u8 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_content_selector() -> String {
    "#vsb_content, .v_news_content".to_string()
}

fn default_param_path() -> String {
    "f/ajax_lnfs_param".to_string()
}

fn default_data_path() -> String {
    "f/ajax_lnfs".to_string()
}
