use admitline::adapters::prose::{
    ProseContext, batch_from_title, classify_item, parse_paragraph_text, parse_paragraphs,
    scan_text_lines,
};
use admitline::model::{RawRecord, SchoolIdentity};
use admitline::normalize::to_record;
use scraper::Html;

fn parse(html: &str, default_batch: &str) -> Vec<RawRecord> {
    let document = Html::parse_document(html);
    parse_paragraphs(document.root_element(), 2024, default_batch)
}

fn tsinghua() -> SchoolIdentity {
    SchoolIdentity {
        key: "tsinghua".to_string(),
        name: "清华大学".to_string(),
        admission_code: "10003".to_string(),
    }
}

#[test]
fn multi_item_paragraph_yields_one_record_per_item() {
    let records = parse(
        "<div><p><strong>【普通批次录取分数线】</strong></p><p>北京：理科 680分；文科 650分；</p></div>",
        "普通批",
    );
    let school = tsinghua();
    let rows: Vec<_> = records.iter().map(|r| to_record(&school, r)).collect();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].source_province, "北京");
    assert_eq!(rows[0].subject_category, "理工");
    assert_eq!(rows[0].min_score, "680");
    assert_eq!(rows[0].batch, "普通批");
    assert_eq!(rows[1].subject_category, "文史");
    assert_eq!(rows[1].min_score, "650");
    assert_eq!(rows[1].admission_type, "统招");
}

#[test]
fn decimal_scores_are_truncated() {
    let ctx = ProseContext::new("普通批");
    let records = parse_paragraph_text("上海：物理类 690.139分；历史类 655分；", &ctx, 2024);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].score.as_deref(), Some("690"));
    assert_eq!(records[0].major.as_deref(), Some("物理组"));
    assert_eq!(records[1].major.as_deref(), Some("历史组"));
}

#[test]
fn single_item_form_only_runs_when_multi_item_finds_nothing() {
    let ctx = ProseContext::new("普通批");

    let multi = parse_paragraph_text("北京：理科 680分；天津：理科 670分", &ctx, 2024);
    assert_eq!(multi.len(), 2);
    assert_eq!(multi[1].province.as_deref(), Some("天津"));

    let single = parse_paragraph_text("天津：675分", &ctx, 2024);
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].score.as_deref(), Some("675"));
}

#[test]
fn province_suffixes_are_accepted_in_markers() {
    let ctx = ProseContext::new("普通批");
    let records = parse_paragraph_text("河北省：物理类 660分；历史类 640分；", &ctx, 2024);

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.province.as_deref() == Some("河北")));
}

#[test]
fn batch_titles_set_batch_and_major_hint() {
    assert_eq!(
        batch_from_title("【提前批次·艺术史论】"),
        Some(("提前批".to_string(), "艺术史论".to_string()))
    );
    assert_eq!(
        batch_from_title("定向批录取分数线"),
        Some(("提前批".to_string(), "定向生".to_string()))
    );
    assert_eq!(
        batch_from_title("【统招批】"),
        Some(("本科一批".to_string(), String::new()))
    );
    assert_eq!(batch_from_title("北京"), None);
}

#[test]
fn hint_fills_empty_labels() {
    let records = parse(
        "<div><p><strong>【提前批次·艺术史论】</strong></p><p>北京：640分</p></div>",
        "普通批",
    );
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].batch.as_deref(), Some("提前批"));
    assert_eq!(records[0].major.as_deref(), Some("艺术史论"));
    assert_eq!(records[0].category.as_deref(), Some("艺术类"));
    assert_eq!(records[0].admission_type.as_deref(), Some("艺术类"));
}

#[test]
fn targeted_labels_become_targeted_admissions() {
    let (category, major, admission_type) = classify_item("理科定向", "提前批");
    assert_eq!(category, "理工");
    assert_eq!(major, "定向生");
    assert_eq!(admission_type, "定向生");

    let (_, _, national) = classify_item("理科", "国家专项计划");
    assert_eq!(national, "国家专项计划");
}

#[test]
fn unknown_labels_keep_text_as_major_without_guessing_category() {
    let (category, major, _) = classify_item("建筑类", "普通批");
    assert_eq!(category, "NA");
    assert_eq!(major, "建筑类");
}

#[test]
fn line_scan_carries_province_and_dedups() {
    let text = "北京\n理工 680\n文史 650\n北京 680\n天津 2024年\n675";
    let records = scan_text_lines(text, 2024, "普通批");

    let pairs: Vec<_> = records
        .iter()
        .map(|r| (r.province.clone().unwrap_or_default(), r.score.clone().unwrap_or_default()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("北京".to_string(), "680".to_string()),
            ("北京".to_string(), "650".to_string()),
            ("天津".to_string(), "675".to_string()),
        ]
    );
}
