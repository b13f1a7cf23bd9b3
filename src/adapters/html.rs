use super::SourceAdapter;
use super::prose::{parse_paragraphs, scan_text_lines};
use super::table::parse_tables;
use crate::config::HtmlConfig;
use crate::fetch::{Transport, get_text};
use crate::model::{FetchOutcome, RawRecord, SchoolIdentity};
use crate::normalize::to_record;
use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector must parse"));

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("body selector must parse"));

static YEAR_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})年").expect("year text regex must compile"));

static YEAR_IN_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:19|20)\d{2})").expect("year href regex must compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlStrategy {
    Table,
    Prose,
    Text,
}

impl HtmlStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            HtmlStrategy::Table => "table",
            HtmlStrategy::Prose => "prose",
            HtmlStrategy::Text => "text",
        }
    }

    pub fn chain(self) -> [HtmlStrategy; 3] {
        match self {
            HtmlStrategy::Prose => [HtmlStrategy::Prose, HtmlStrategy::Table, HtmlStrategy::Text],
            HtmlStrategy::Table | HtmlStrategy::Text => {
                [HtmlStrategy::Table, HtmlStrategy::Prose, HtmlStrategy::Text]
            }
        }
    }

    pub fn default_batch(self) -> &'static str {
        match self {
            HtmlStrategy::Prose => "普通批",
            HtmlStrategy::Table | HtmlStrategy::Text => "本科一批",
        }
    }
}

pub fn discover_year_links(html: &str, base_url: &str) -> Result<BTreeMap<i32, String>> {
    let base = Url::parse(base_url).with_context(|| format!("invalid list url {base_url}"))?;
    let document = Html::parse_document(html);

    let links: Vec<(String, String)> = document
        .select(&LINK)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let text = a.text().collect::<String>().trim().to_string();
            Some((href, text))
        })
        .collect();

    let mut found = BTreeMap::new();
    for (href, text) in &links {
        if let Some(year) = YEAR_IN_TEXT
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok())
            && let Ok(url) = base.join(href)
        {
            found.entry(year).or_insert_with(|| url.to_string());
        }
    }

    if found.is_empty() {
        for (href, _) in &links {
            if let Some(year) = YEAR_IN_HREF
                .captures(href)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i32>().ok())
                && let Ok(url) = base.join(href)
            {
                found.entry(year).or_insert_with(|| url.to_string());
            }
        }
    }

    Ok(found)
}

fn content_root<'a>(document: &'a Html, content_selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(content_selector).ok();
    selector
        .as_ref()
        .and_then(|s| document.select(s).next())
        .or_else(|| document.select(&BODY).next())
}

fn plain_lines(root: ElementRef<'_>) -> String {
    root.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_page(
    html: &str,
    primary: HtmlStrategy,
    config: &HtmlConfig,
    year: i32,
) -> (Vec<RawRecord>, Option<HtmlStrategy>) {
    let document = Html::parse_document(html);
    let Some(root) = content_root(&document, &config.content_selector) else {
        return (Vec::new(), None);
    };
    let default_batch = config
        .default_batch
        .as_deref()
        .unwrap_or(primary.default_batch());

    for strategy in primary.chain() {
        let records = match strategy {
            HtmlStrategy::Table => parse_tables(root, config.table_layout, year, default_batch),
            HtmlStrategy::Prose => parse_paragraphs(root, year, default_batch),
            HtmlStrategy::Text => scan_text_lines(&plain_lines(root), year, default_batch),
        };
        if !records.is_empty() {
            return (records, Some(strategy));
        }
        warn!(strategy = strategy.as_str(), year, "strategy found no records");
    }

    (Vec::new(), None)
}

pub struct HtmlAdapter {
    school: SchoolIdentity,
    config: HtmlConfig,
    primary: HtmlStrategy,
    transport: Box<dyn Transport>,
    year_links: Option<BTreeMap<i32, String>>,
}

impl HtmlAdapter {
    pub fn new(
        school: SchoolIdentity,
        config: HtmlConfig,
        primary: HtmlStrategy,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            school,
            config,
            primary,
            transport,
            year_links: None,
        }
    }

    fn page_url(&mut self, year: i32) -> Result<Option<String>> {
        if let Some(template) = &self.config.year_url_template {
            return Ok(Some(template.replace("{year}", &year.to_string())));
        }

        let Some(list_url) = self.config.list_url.clone() else {
            return Ok(None);
        };
        if self.year_links.is_none() {
            let list = get_text(self.transport.as_mut(), &list_url)?;
            let links = discover_year_links(&list, &list_url)?;
            info!(school = %self.school.key, years = ?links.keys().collect::<Vec<_>>(), "year links discovered");
            self.year_links = Some(links);
        }

        Ok(self
            .year_links
            .as_ref()
            .and_then(|links| links.get(&year).cloned()))
    }
}

impl SourceAdapter for HtmlAdapter {
    fn key(&self) -> &str {
        &self.school.key
    }

    fn fetch(&mut self, year: i32) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome {
            units_attempted: 1,
            ..FetchOutcome::default()
        };

        let url = match self.page_url(year) {
            Ok(Some(url)) => url,
            Ok(None) => {
                warn!(school = %self.school.key, year, "no page found for year");
                outcome.units_failed = 1;
                return Ok(outcome);
            }
            Err(err) => {
                warn!(school = %self.school.key, year, error = %err, "year page lookup failed");
                outcome.units_failed = 1;
                return Ok(outcome);
            }
        };

        let body = match get_text(self.transport.as_mut(), &url) {
            Ok(body) => body,
            Err(err) => {
                warn!(school = %self.school.key, %url, error = %err, "page fetch failed");
                outcome.units_failed = 1;
                return Ok(outcome);
            }
        };

        let (raws, strategy) = parse_page(&body, self.primary, &self.config, year);
        debug!(
            school = %self.school.key,
            %url,
            strategy = strategy.map(HtmlStrategy::as_str).unwrap_or("none"),
            records = raws.len(),
            "page parsed"
        );

        outcome.records = raws.iter().map(|raw| to_record(&self.school, raw)).collect();
        Ok(outcome)
    }
}
