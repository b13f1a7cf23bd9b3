use admitline::export::export;
use admitline::loader::{
    MAX_MAJOR_LEN, clean_code, dedup_rows, load_exports, read_institutions, sanitize_text,
    shorten_major_name, to_int,
};
use admitline::model::{AdmissionRecord, ScoreRow};
use admitline::pipeline::{LoadOptions, run_load};
use admitline::store::{JsonStore, load_state};
use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn record(code: &str, province: &str, major: &str, score: &str) -> AdmissionRecord {
    AdmissionRecord {
        year: "2024".to_string(),
        school_name: "北京大学".to_string(),
        tier_985: "1".to_string(),
        tier_211: "1".to_string(),
        tier_double_first_class: "1".to_string(),
        subject_category: "理工".to_string(),
        batch: "本科一批".to_string(),
        major: major.to_string(),
        min_score: score.to_string(),
        min_rank: "NA".to_string(),
        admission_code: code.to_string(),
        admission_type: "统招".to_string(),
        source_province: province.to_string(),
    }
}

fn write_institutions(path: &Path) -> Result<()> {
    fs::write(
        path,
        "\u{feff}全国统一招生代码,大学,985,211,双一流,省份,城市\n10001.0,北京大学,1,1,1,北京,北京\n10003,清华大学,1,1,1,北京,北京\n",
    )?;
    Ok(())
}

#[test]
fn long_list_majors_are_cut_at_a_separator() {
    let major = format!("工科试验班（{}）", vec!["机械工程"; 80].join("、"));
    let shortened = shorten_major_name(&major, MAX_MAJOR_LEN);

    assert!(shortened.chars().count() <= MAX_MAJOR_LEN);
    assert!(shortened.ends_with("等）"));
    assert!(!shortened.contains("、等"));
}

#[test]
fn long_majors_without_separator_are_cut_hard() {
    let major = "很".repeat(300);
    let shortened = shorten_major_name(&major, MAX_MAJOR_LEN);
    assert_eq!(shortened.chars().count(), MAX_MAJOR_LEN);

    assert_eq!(shorten_major_name("计算机类", MAX_MAJOR_LEN), "计算机类");
}

#[test]
fn codes_and_numbers_survive_spreadsheet_formatting() {
    assert_eq!(clean_code("10001.0"), Some(10001));
    assert_eq!(clean_code(" 10487 "), Some(10487));
    assert_eq!(clean_code("代码10055"), Some(10055));
    assert_eq!(clean_code("NA"), None);

    assert_eq!(to_int("650"), Some(650));
    assert_eq!(to_int("650.6"), Some(650));
    assert_eq!(to_int("-3.9"), Some(-3));
    assert_eq!(to_int("NA"), None);

    assert_eq!(sanitize_text("  计算机  类 "), Some("计算机 类".to_string()));
    assert_eq!(sanitize_text("NA"), None);
}

#[test]
fn duplicate_rows_keep_the_first() {
    let row = ScoreRow {
        college_code: 10001,
        subject_type: "理工".to_string(),
        major_name: "数学类".to_string(),
        province: "北京".to_string(),
        admission_year: 2024,
        min_score: 680,
        min_rank: None,
    };
    let mut other_type = row.clone();
    other_type.subject_type = "综合改革".to_string();

    let (kept, removed) = dedup_rows(vec![row.clone(), other_type, row]);
    assert_eq!(kept.len(), 1);
    assert_eq!(removed, 2);
    assert_eq!(kept[0].subject_type, "理工");
}

#[test]
fn institutions_read_chinese_headers() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("colleges.csv");
    write_institutions(&path)?;

    let rows = read_institutions(&path)?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].admission_code, 10001);
    assert_eq!(rows[0].tier_985, 1);
    assert_eq!(rows[1].name, "清华大学");
    Ok(())
}

#[test]
fn load_filters_unknown_codes_and_skips_bad_files() -> Result<()> {
    let dir = tempdir()?;
    let out_dir = dir.path().join("out");
    let institutions = dir.path().join("colleges.csv");
    write_institutions(&institutions)?;

    let long_major = vec!["机械工程"; 80].join("、");
    export(
        &[
            record("10001", "北京", "数学类", "680"),
            record("10001", "北京", "数学类", "680"),
            record("10001", "天津", &long_major, "670"),
            record("10001", "河北", "NA", "NA"),
            record("99999", "北京", "数学类", "600"),
        ],
        &out_dir,
        Some("北京大学"),
        Some(2024),
    )?;
    fs::create_dir_all(out_dir.join("broken"))?;
    fs::write(out_dir.join("broken").join("broken_2024.csv"), "year,school\n2024,x\n")?;

    let mut store = JsonStore::open(&dir.path().join("store.json"))?;
    let report = load_exports(&out_dir, Some(&institutions), &mut store)?;

    assert_eq!(report.files_seen, 2);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.rows_read, 5);
    assert_eq!(report.rows_unmatched, 1);
    assert_eq!(report.rows_incomplete, 1);
    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.majors_shortened, 1);
    assert_eq!(report.institutions_upserted, 2);
    assert_eq!(report.inserted, 2);

    let state = store.state();
    assert_eq!(state.scores.len(), 2);
    assert!(state.scores.iter().all(|s| s.major_name.chars().count() <= 224));
    Ok(())
}

#[test]
fn reloading_the_same_exports_inserts_nothing_new() -> Result<()> {
    let dir = tempdir()?;
    let out_dir = dir.path().join("out");
    let store_path = dir.path().join("data").join("store.json");
    export(
        &[record("10001", "北京", "数学类", "680")],
        &out_dir,
        Some("北京大学"),
        Some(2024),
    )?;

    let options = LoadOptions {
        out_dir,
        store_path: store_path.clone(),
        institutions: None,
    };
    let first = run_load(&options)?;
    let second = run_load(&options)?;

    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(load_state(&store_path)?.scores.len(), 1);
    Ok(())
}

#[test]
fn separator_before_the_limit_bounds_the_cut() {
    let major = format!("{}、{}", "甲".repeat(200), "乙".repeat(29));
    assert_eq!(major.chars().count(), 230);

    let shortened = shorten_major_name(&major, MAX_MAJOR_LEN);
    assert_eq!(shortened, "甲".repeat(200));

    let with_paren = format!("（{}、{}", "甲".repeat(199), "乙".repeat(29));
    let shortened = shorten_major_name(&with_paren, MAX_MAJOR_LEN);
    assert!(shortened.ends_with("等）"));
    assert!(shortened.chars().count() <= MAX_MAJOR_LEN);
}
