use crate::config::{FetchConfig, FetchMode, LoadedSchool, resolve_path};
use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Every response that made it back from the server is returned, 4xx included.
/// `Err` means the request itself failed.
pub trait Transport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse>;
}

pub fn get_text(transport: &mut dyn Transport, url: &str) -> Result<String> {
    let response = transport.execute(&HttpRequest::get(url))?;
    if !response.is_success() {
        bail!("request to {url} failed with status {}", response.status);
    }
    Ok(response.text())
}

pub fn open_transport(school: &LoadedSchool) -> Result<Box<dyn Transport>> {
    let fetch = &school.config.fetch;
    match fetch.mode {
        FetchMode::Http => Ok(Box::new(HttpTransport::new(
            fetch,
            Duration::from_millis(school.config.request_delay_ms()),
        )?)),
        FetchMode::File => {
            let dir = fetch
                .fixture_dir
                .as_ref()
                .context("fetch.fixture_dir missing for file mode")?;
            let resolved = resolve_path(&school.path, dir)?;
            info!(
                school = %school.config.school.key,
                dir = %resolved.display(),
                "serving responses from fixture directory"
            );
            Ok(Box::new(FixtureTransport::new(resolved)))
        }
    }
}

pub fn pacing_delay(last_request: Option<Instant>, now: Instant, delay: Duration) -> Duration {
    match last_request {
        Some(last) => delay.saturating_sub(now.saturating_duration_since(last)),
        None => Duration::ZERO,
    }
}

pub struct HttpTransport {
    client: Client,
    retry_attempts: u8,
    retry_backoff_ms: u64,
    request_delay: Duration,
    last_request: Option<Instant>,
}

impl HttpTransport {
    pub fn new(fetch: &FetchConfig, request_delay: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (k, v) in &fetch.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .with_context(|| format!("invalid header name {k}"))?;
            let value =
                HeaderValue::from_str(v).with_context(|| format!("invalid header value for {k}"))?;
            headers.insert(name, value);
        }

        if let Some(user_agent) = &fetch.user_agent {
            headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            retry_attempts: fetch.retry_attempts,
            retry_backoff_ms: fetch.retry_backoff_ms,
            request_delay,
            last_request: None,
        })
    }

    fn pace(&mut self) {
        let wait = pacing_delay(self.last_request, Instant::now(), self.request_delay);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        self.last_request = Some(Instant::now());
    }

    fn build(&self, request: &HttpRequest) -> reqwest::blocking::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if request.method == Method::Post {
            builder = builder.form(&request.form);
        }
        for (k, v) in &request.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        builder
    }
}

impl Transport for HttpTransport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        let attempts = self.retry_attempts.max(1);
        let url = request.url.as_str();

        for attempt in 1..=attempts {
            self.pace();

            match self.build(request).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() && attempt < attempts {
                        warn!(%url, %status, attempt, "server error; retrying");
                    } else {
                        let headers = resp
                            .headers()
                            .iter()
                            .filter_map(|(k, v)| {
                                v.to_str()
                                    .ok()
                                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
                            })
                            .collect();
                        let final_url = resp.url().to_string();
                        let body = resp
                            .bytes()
                            .with_context(|| format!("failed to read body from {url}"))?
                            .to_vec();
                        debug!(%url, status = status.as_u16(), bytes = body.len(), "response received");
                        return Ok(HttpResponse {
                            url: final_url,
                            status: status.as_u16(),
                            headers,
                            body,
                        });
                    }
                }
                Err(err) => {
                    if attempt == attempts {
                        return Err(err).with_context(|| format!("request to {url} failed"));
                    }
                    warn!(%url, attempt, error = %err, "request errored; retrying");
                }
            }

            std::thread::sleep(Duration::from_millis(self.retry_backoff_ms));
        }

        bail!("request to {url} failed after retries")
    }
}

pub struct FixtureTransport {
    root: PathBuf,
}

impl FixtureTransport {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn fixture_name(request: &HttpRequest) -> Result<String> {
        let url = Url::parse(&request.url)
            .with_context(|| format!("invalid request url {}", request.url))?;
        let path = url.path().trim_matches('/').replace('/', "_");
        let mut name = if path.is_empty() {
            "index".to_string()
        } else {
            path
        };

        let values: Vec<&str> = request
            .form
            .iter()
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
            .collect();
        if !values.is_empty() {
            name.push_str("__");
            name.push_str(&values.join("_"));
        }
        Ok(name)
    }
}

impl Transport for FixtureTransport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        let name = Self::fixture_name(request)?;
        let path = self.root.join(&name);
        if !path.exists() {
            debug!(file = %path.display(), "fixture missing; answering 404");
            return Ok(HttpResponse {
                url: request.url.clone(),
                status: 404,
                headers: BTreeMap::new(),
                body: Vec::new(),
            });
        }

        let body = std::fs::read(&path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        debug!(file = %path.display(), bytes = body.len(), "fixture served");
        Ok(HttpResponse {
            url: request.url.clone(),
            status: 200,
            headers: BTreeMap::new(),
            body,
        })
    }
}
