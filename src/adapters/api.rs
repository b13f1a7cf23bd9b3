use super::SourceAdapter;
use crate::config::ApiConfig;
use crate::fetch::{HttpRequest, HttpResponse, Transport};
use crate::model::{FetchOutcome, RawRecord, SchoolIdentity};
use crate::normalize::{DEFAULT_PROVINCES, to_record, truncate_decimals};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

const TOKEN_HEADERS: [&str; 2] = ["csrf-token", "x-csrf-token"];
const TOKEN_REQUEST_HEADER: &str = "Csrf-Token";

static META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[name][content]").expect("meta selector must parse"));

static SCRIPT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)csrf[_-]?token["']?\s*[:=]\s*["']([^"']+)["']"#)
        .expect("script token regex must compile")
});

pub fn token_from_headers(response: &HttpResponse) -> Option<String> {
    TOKEN_HEADERS
        .iter()
        .find_map(|name| response.header(name))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn token_from_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let from_meta = document.select(&META).find_map(|meta| {
        let name = meta.value().attr("name")?;
        if !name.to_ascii_lowercase().contains("csrf") {
            return None;
        }
        let content = meta.value().attr("content")?.trim();
        (!content.is_empty()).then(|| content.to_string())
    });

    from_meta.or_else(|| {
        SCRIPT_TOKEN
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| truncate_decimals(trimmed))
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| (f.trunc() as i64).to_string())
            }
        }
        _ => None,
    }
}

fn field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(value_text)
}

fn rank_field(item: &Value) -> Option<String> {
    ["minRank", "minOrder"]
        .iter()
        .filter_map(|key| field(item, key))
        .find(|v| v != "0")
}

pub fn parse_api_payload(data: &Value, year: i32, province: &str) -> Vec<RawRecord> {
    let mut out = Vec::new();
    let list = |key: &str| {
        data.get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    for item in list("zsSsgradeList") {
        out.push(RawRecord {
            year: field(&item, "nf").or_else(|| Some(year.to_string())),
            province: field(&item, "ssmc").or_else(|| Some(province.to_string())),
            category: field(&item, "klmc"),
            batch: Some("普通批".to_string()),
            major: None,
            score: field(&item, "minScore"),
            rank: rank_field(&item),
            admission_type: field(&item, "zslx"),
        });
    }

    for item in list("sszygradeList") {
        out.push(RawRecord {
            year: field(&item, "nf").or_else(|| Some(year.to_string())),
            province: field(&item, "ssmc").or_else(|| Some(province.to_string())),
            category: field(&item, "klmc"),
            batch: Some("普通批".to_string()),
            major: field(&item, "zymc"),
            score: field(&item, "minScore"),
            rank: None,
            admission_type: field(&item, "zslx"),
        });
    }

    out
}

pub fn parse_province_filter(data: &Value) -> Vec<String> {
    let options = data.get("ssmc_nf_klmc_sex_campus_zslx_list");
    let items = options
        .and_then(|o| o.get("ssmc"))
        .or(options)
        .and_then(Value::as_array);

    items
        .into_iter()
        .flatten()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            other => other.get("name").and_then(value_text),
        })
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn unwrap_envelope(body: &[u8]) -> Result<Value> {
    let mut envelope: Value =
        serde_json::from_slice(body).context("response is not valid json")?;
    let state = envelope.get("state").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });
    if state != Some(1) {
        let message = envelope
            .get("msg")
            .or_else(|| envelope.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        bail!("server reported state {state:?}: {message}");
    }
    Ok(envelope
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub struct ApiAdapter {
    school: SchoolIdentity,
    config: ApiConfig,
    transport: Box<dyn Transport>,
    token: Option<String>,
    session_ready: bool,
}

impl ApiAdapter {
    pub fn new(school: SchoolIdentity, config: ApiConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            school,
            config,
            transport,
            token: None,
            session_ready: false,
        }
    }

    fn init_session(&mut self) -> Result<()> {
        if self.session_ready || !self.config.csrf {
            return Ok(());
        }
        let entry = self
            .config
            .entry_url
            .clone()
            .unwrap_or_else(|| self.config.base_url.clone());

        let response = self
            .transport
            .execute(&HttpRequest::get(&entry))
            .with_context(|| format!("failed to open session at {entry}"))?;
        if !response.is_success() {
            bail!("session page {entry} answered status {}", response.status);
        }

        self.token = token_from_headers(&response).or_else(|| token_from_html(&response.text()));
        self.session_ready = true;
        info!(
            school = %self.school.key,
            token = self.token.is_some(),
            "session initialised"
        );
        Ok(())
    }

    fn request(&self, path: &str, form: Vec<(String, String)>) -> HttpRequest {
        let referer = self
            .config
            .entry_url
            .clone()
            .unwrap_or_else(|| self.config.base_url.clone());
        let mut request = HttpRequest::post(join_url(&self.config.base_url, path))
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", referer)
            .header("Origin", self.config.base_url.trim_end_matches('/'));
        request.form = form;

        if self.config.timestamp {
            let now = Utc::now().timestamp_millis().to_string();
            request.query.push(("ts".to_string(), now.clone()));
            request = request.header("X-Requested-Time", now);
        }
        if let Some(token) = &self.token {
            request = request.header(TOKEN_REQUEST_HEADER, token.clone());
        }
        request
    }

    fn send(&mut self, path: &str, form: Vec<(String, String)>) -> Result<HttpResponse> {
        let request = self.request(path, form.clone());
        let response = self.transport.execute(&request)?;
        let fresh = token_from_headers(&response);

        if response.status == 403 && self.config.csrf {
            let Some(token) = fresh else {
                bail!("request to {} was refused and no new token was offered", request.url);
            };
            warn!(school = %self.school.key, "token rejected; retrying with refreshed token");
            self.token = Some(token);
            let retry = self.request(path, form);
            let response = self.transport.execute(&retry)?;
            if let Some(token) = token_from_headers(&response) {
                self.token = Some(token);
            }
            return Ok(response);
        }

        if fresh.is_some() {
            self.token = fresh;
        }
        Ok(response)
    }

    fn query_form(province: &str, year: &str) -> Vec<(String, String)> {
        [
            ("ssmc", province),
            ("zsnf", year),
            ("klmc", ""),
            ("sex", ""),
            ("campus", ""),
            ("zslx", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn provinces(&mut self) -> Vec<String> {
        if !self.config.provinces.is_empty() {
            return self.config.provinces.clone();
        }

        let path = self.config.param_path.clone();
        let listed = self
            .send(&path, Self::query_form("", ""))
            .and_then(|response| {
                if !response.is_success() {
                    bail!("filter endpoint answered status {}", response.status);
                }
                unwrap_envelope(&response.body)
            })
            .map(|data| parse_province_filter(&data));

        match listed {
            Ok(provinces) if !provinces.is_empty() => provinces,
            Ok(_) => {
                warn!(school = %self.school.key, "filter endpoint listed no provinces; using defaults");
                DEFAULT_PROVINCES.iter().map(|p| p.to_string()).collect()
            }
            Err(err) => {
                warn!(school = %self.school.key, error = %err, "filter endpoint failed; using defaults");
                DEFAULT_PROVINCES.iter().map(|p| p.to_string()).collect()
            }
        }
    }

    fn fetch_unit(&mut self, province: &str, year: i32) -> Result<Vec<RawRecord>> {
        let path = self.config.data_path.clone();
        let response = self.send(&path, Self::query_form(province, &year.to_string()))?;
        if !response.is_success() {
            bail!("data endpoint answered status {}", response.status);
        }
        let data = unwrap_envelope(&response.body)?;
        Ok(parse_api_payload(&data, year, province))
    }
}

impl SourceAdapter for ApiAdapter {
    fn key(&self) -> &str {
        &self.school.key
    }

    fn fetch(&mut self, year: i32) -> Result<FetchOutcome> {
        self.init_session()?;

        let provinces = self.provinces();
        let mut outcome = FetchOutcome::default();

        for province in &provinces {
            outcome.units_attempted += 1;
            match self.fetch_unit(province, year) {
                Ok(raws) => {
                    debug!(school = %self.school.key, %province, records = raws.len(), "province fetched");
                    outcome
                        .records
                        .extend(raws.iter().map(|raw| to_record(&self.school, raw)));
                }
                Err(err) => {
                    warn!(school = %self.school.key, %province, year, error = %err, "province fetch failed");
                    outcome.units_failed += 1;
                }
            }
        }

        info!(
            school = %self.school.key,
            year,
            provinces = provinces.len(),
            failed = outcome.units_failed,
            records = outcome.records.len(),
            "api crawl complete"
        );
        Ok(outcome)
    }
}
