pub mod api;
pub mod html;
pub mod prose;
pub mod table;

use crate::config::{AdapterKind, LoadedSchool};
use crate::fetch::{Transport, open_transport};
use crate::model::FetchOutcome;
use anyhow::{Context, Result};
use api::ApiAdapter;
use html::{HtmlAdapter, HtmlStrategy};

pub trait SourceAdapter {
    fn key(&self) -> &str;

    /// Records for one admission year. Failing units (a province, a page) are
    /// logged and counted in the outcome; `Err` is reserved for failures that
    /// make the whole school unusable.
    fn fetch(&mut self, year: i32) -> Result<FetchOutcome>;
}

pub fn build_adapter(school: &LoadedSchool) -> Result<Box<dyn SourceAdapter>> {
    let transport = open_transport(school)?;
    build_adapter_with(school, transport)
}

pub fn build_adapter_with(
    school: &LoadedSchool,
    transport: Box<dyn Transport>,
) -> Result<Box<dyn SourceAdapter>> {
    let identity = school.identity();
    let config = &school.config;

    let adapter: Box<dyn SourceAdapter> = match config.adapter.kind {
        AdapterKind::Api => {
            let api = config
                .api
                .clone()
                .with_context(|| format!("school {} has no [api] section", identity.key))?;
            Box::new(ApiAdapter::new(identity, api, transport))
        }
        AdapterKind::Table => Box::new(HtmlAdapter::new(
            identity,
            config.html.clone(),
            HtmlStrategy::Table,
            transport,
        )),
        AdapterKind::Prose => Box::new(HtmlAdapter::new(
            identity,
            config.html.clone(),
            HtmlStrategy::Prose,
            transport,
        )),
    };
    Ok(adapter)
}
