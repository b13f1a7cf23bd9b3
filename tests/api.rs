use admitline::adapters::SourceAdapter;
use admitline::adapters::api::{
    ApiAdapter, parse_api_payload, parse_province_filter, token_from_html, unwrap_envelope,
};
use admitline::cleaner::{TierTable, clean_batch};
use admitline::config::ApiConfig;
use admitline::fetch::{HttpRequest, HttpResponse, Transport};
use admitline::model::SchoolIdentity;
use admitline::normalize::to_record;
use anyhow::{Result, bail};
use serde_json::json;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Answers requests from a queue and records what was sent.
#[derive(Clone, Default)]
struct ScriptedTransport {
    responses: Rc<RefCell<VecDeque<Result<HttpResponse>>>>,
    sent: Rc<RefCell<Vec<HttpRequest>>>,
}

impl ScriptedTransport {
    fn push(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        self.responses.borrow_mut().push_back(Ok(HttpResponse {
            url: String::new(),
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            body: body.as_bytes().to_vec(),
        }));
    }

    fn push_error(&self) {
        self.responses
            .borrow_mut()
            .push_back(Err(anyhow::anyhow!("connection refused")));
    }

    fn sent(&self) -> Vec<HttpRequest> {
        self.sent.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        self.sent.borrow_mut().push(request.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(response) => response,
            None => bail!("no scripted response for {}", request.url),
        }
    }
}

fn identity() -> SchoolIdentity {
    SchoolIdentity {
        key: "nankai".to_string(),
        name: "南开大学".to_string(),
        admission_code: "10055".to_string(),
    }
}

fn config(csrf: bool, provinces: &[&str]) -> ApiConfig {
    ApiConfig {
        base_url: "https://lqcx.nankai.edu.cn".to_string(),
        entry_url: Some("https://lqcx.nankai.edu.cn/zsw/lnfs.html".to_string()),
        param_path: "f/ajax_lnfs_param".to_string(),
        data_path: "f/ajax_lnfs".to_string(),
        csrf,
        timestamp: true,
        provinces: provinces.iter().map(|p| p.to_string()).collect(),
    }
}

const BEIJING: &str = r#"{"state":1,"data":{"zsSsgradeList":[{"nf":2024,"ssmc":"北京","klmc":"综合改革","minScore":675.6,"minRank":0,"minOrder":"850","zslx":"国家专项"}],"sszygradeList":[]}}"#;

#[test]
fn forbidden_response_refreshes_token_exactly_once() -> Result<()> {
    let transport = ScriptedTransport::default();
    transport.push(200, &[], r#"<meta name="csrf-token" content="first">"#);
    transport.push(403, &[("Csrf-Token", "second")], "");
    transport.push(200, &[], BEIJING);

    let mut adapter = ApiAdapter::new(identity(), config(true, &["北京"]), Box::new(transport.clone()));
    let outcome = adapter.fetch(2024)?;

    assert_eq!(outcome.units_attempted, 1);
    assert_eq!(outcome.units_failed, 0);
    assert_eq!(outcome.records.len(), 1);

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].header_value("Csrf-Token"), Some("first"));
    assert_eq!(sent[2].header_value("Csrf-Token"), Some("second"));
    assert!(sent[2].query.iter().any(|(k, _)| k == "ts"));
    assert!(sent[2].header_value("X-Requested-Time").is_some());
    Ok(())
}

#[test]
fn second_forbidden_response_fails_the_unit() -> Result<()> {
    let transport = ScriptedTransport::default();
    transport.push(200, &[("X-Csrf-Token", "first")], "");
    transport.push(403, &[("Csrf-Token", "second")], "");
    transport.push(403, &[("Csrf-Token", "third")], "");
    transport.push(200, &[], BEIJING);

    let mut adapter = ApiAdapter::new(
        identity(),
        config(true, &["天津", "北京"]),
        Box::new(transport.clone()),
    );
    let outcome = adapter.fetch(2024)?;

    assert_eq!(outcome.units_attempted, 2);
    assert_eq!(outcome.units_failed, 1);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(transport.sent().len(), 4);
    Ok(())
}

#[test]
fn session_failure_aborts_the_school() {
    let transport = ScriptedTransport::default();
    transport.push_error();

    let mut adapter = ApiAdapter::new(identity(), config(true, &["北京"]), Box::new(transport));
    assert!(adapter.fetch(2024).is_err());
}

#[test]
fn failed_filter_endpoint_uses_default_provinces() -> Result<()> {
    let transport = ScriptedTransport::default();
    transport.push(500, &[], "");

    let mut adapter = ApiAdapter::new(identity(), config(false, &[]), Box::new(transport.clone()));
    let outcome = adapter.fetch(2024)?;

    assert_eq!(outcome.units_attempted, 31);
    assert_eq!(outcome.units_failed, 31);
    assert!(outcome.records.is_empty());
    Ok(())
}

#[test]
fn non_success_state_is_an_error() {
    let err = unwrap_envelope(br#"{"state":0,"msg":"busy"}"#).expect_err("state 0 must fail");
    assert!(err.to_string().contains("busy"));

    let data = unwrap_envelope(br#"{"state":"1","data":{"x":1}}"#).expect("string state 1");
    assert_eq!(data, json!({"x": 1}));
}

#[test]
fn payload_scores_are_truncated_and_ranks_fall_back() {
    let data = json!({
        "zsSsgradeList": [
            {"nf": 2024, "klmc": "物理类", "minScore": 675.9, "minRank": 0, "minOrder": 850, "zslx": ""}
        ],
        "sszygradeList": [
            {"nf": "2024", "klmc": "物理类", "zymc": "金融学", "minScore": "680.5", "minRank": 120}
        ]
    });
    let records = parse_api_payload(&data, 2024, "天津");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].score.as_deref(), Some("675"));
    assert_eq!(records[0].rank.as_deref(), Some("850"));
    assert_eq!(records[0].province.as_deref(), Some("天津"));
    assert_eq!(records[0].major, None);
    assert_eq!(records[1].score.as_deref(), Some("680"));
    assert_eq!(records[1].rank, None);
    assert_eq!(records[1].major.as_deref(), Some("金融学"));
}

#[test]
fn dash_scores_export_as_na() {
    let data = json!({
        "zsSsgradeList": [
            {"nf": 2024, "klmc": "物理类", "minScore": "-", "minRank": "--", "zslx": "普通类"}
        ],
        "sszygradeList": [
            {"nf": 2024, "klmc": "物理类", "zymc": "金融学", "minScore": "暂无"}
        ]
    });
    let records: Vec<_> = parse_api_payload(&data, 2024, "天津")
        .iter()
        .map(|raw| to_record(&identity(), raw))
        .collect();
    let cleaned = clean_batch(records, TierTable::builtin());

    assert_eq!(cleaned.records.len(), 2);
    assert!(cleaned.records.iter().all(|r| r.min_score == "NA" && r.min_rank == "NA"));
}

#[test]
fn filter_lists_province_names() {
    let data = json!({"ssmc_nf_klmc_sex_campus_zslx_list": {"ssmc": [{"name": "北京"}, {"name": ""}, "天津"]}});
    assert_eq!(parse_province_filter(&data), vec!["北京", "天津"]);
}

#[test]
fn token_is_found_in_scripts() {
    let html = r#"<script>var config = { csrfToken: "abc123" };</script>"#;
    assert_eq!(token_from_html(html), Some("abc123".to_string()));
}
