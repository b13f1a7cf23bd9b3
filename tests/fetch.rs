use admitline::fetch::{FixtureTransport, HttpRequest, Transport, pacing_delay};
use anyhow::Result;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::tempdir;

#[test]
fn first_request_is_not_delayed() {
    let delay = Duration::from_millis(500);
    assert_eq!(pacing_delay(None, Instant::now(), delay), Duration::ZERO);
}

#[test]
fn requests_are_spaced_by_the_configured_delay() {
    let delay = Duration::from_millis(500);
    let last = Instant::now();

    let soon = last + Duration::from_millis(200);
    assert_eq!(pacing_delay(Some(last), soon, delay), Duration::from_millis(300));

    let later = last + Duration::from_millis(800);
    assert_eq!(pacing_delay(Some(last), later, delay), Duration::ZERO);

    assert_eq!(pacing_delay(Some(last), soon, Duration::ZERO), Duration::ZERO);
}

#[test]
fn fixture_names_follow_path_and_form_values() -> Result<()> {
    let mut request = HttpRequest::post("https://lqcx.nankai.edu.cn/f/ajax_lnfs");
    request.form = vec![
        ("ssmc".to_string(), "北京".to_string()),
        ("zsnf".to_string(), "2024".to_string()),
        ("klmc".to_string(), String::new()),
    ];
    assert_eq!(FixtureTransport::fixture_name(&request)?, "f_ajax_lnfs__北京_2024");

    let page = HttpRequest::get("https://join-tsinghua.edu.cn/info/1010/2024.htm");
    assert_eq!(FixtureTransport::fixture_name(&page)?, "info_1010_2024.htm");
    Ok(())
}

#[test]
fn missing_fixture_answers_not_found() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("index"), "home")?;
    let mut transport = FixtureTransport::new(dir.path().to_path_buf());

    let home = transport.execute(&HttpRequest::get("https://example.edu.cn/"))?;
    assert_eq!(home.status, 200);
    assert_eq!(home.text(), "home");

    let missing = transport.execute(&HttpRequest::get("https://example.edu.cn/none.htm"))?;
    assert_eq!(missing.status, 404);
    assert!(!missing.is_success());
    Ok(())
}
