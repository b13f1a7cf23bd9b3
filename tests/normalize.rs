use admitline::model::{RawRecord, SchoolIdentity};
use admitline::normalize::{
    canonical_batch, first_integer, infer_category, normalize_admission_type, normalize_category,
    normalize_province, to_record, truncate_decimals,
};

#[test]
fn provinces_lose_suffixes_and_qualifiers() {
    assert_eq!(normalize_province("河北省"), "河北");
    assert_eq!(normalize_province("北京市"), "北京");
    assert_eq!(normalize_province("西藏自治区"), "西藏");
    assert_eq!(normalize_province("广西壮族自治区"), "广西");
    assert_eq!(normalize_province("新疆维吾尔自治区"), "新疆");
    assert_eq!(normalize_province("宁夏回族自治区"), "宁夏");
    assert_eq!(normalize_province("新疆（少数民族）"), "新疆");
    assert_eq!(normalize_province("内蒙古(蒙授"), "内蒙古");
    assert_eq!(normalize_province("湖北"), "湖北");
}

#[test]
fn decimals_are_truncated_not_rounded() {
    assert_eq!(truncate_decimals("上海：690.999分"), "上海：690分");
    assert_eq!(first_integer("655.5"), Some("655".to_string()));
    assert_eq!(first_integer("-"), None);
}

#[test]
fn category_inference_prefers_reform_groups() {
    assert_eq!(infer_category("物理类"), "综合改革");
    assert_eq!(infer_category("历史类"), "综合改革");
    assert_eq!(infer_category("理科"), "理工");
    assert_eq!(infer_category("文史"), "文史");
    assert_eq!(infer_category("音乐表演"), "艺术类");
    assert_eq!(infer_category("临床医学"), "NA");
}

#[test]
fn source_category_labels_are_kept_when_unrecognised() {
    assert_eq!(normalize_category("理工"), "理工");
    assert_eq!(normalize_category("物理类"), "综合改革");
    assert_eq!(normalize_category("体育类"), "体育类");
    assert_eq!(normalize_category(""), "NA");
}

#[test]
fn batches_and_admission_types_are_canonical() {
    assert_eq!(canonical_batch("国家专项计划"), Some("国家专项计划"));
    assert_eq!(canonical_batch("高校专项"), Some("高校专项计划"));
    assert_eq!(canonical_batch("本科提前批"), Some("提前批"));
    assert_eq!(canonical_batch("湖北"), None);

    assert_eq!(normalize_admission_type("普通类"), "统招");
    assert_eq!(normalize_admission_type(""), "统招");
    assert_eq!(normalize_admission_type("国家专项"), "国家专项计划");
    assert_eq!(normalize_admission_type("定向"), "定向生");
}

#[test]
fn records_are_fully_populated_with_na() {
    let school = SchoolIdentity {
        key: "pku".to_string(),
        name: "北京大学".to_string(),
        admission_code: "10001".to_string(),
    };
    let raw = RawRecord {
        year: Some("2024".to_string()),
        province: Some("河北省".to_string()),
        score: Some("660.5".to_string()),
        ..RawRecord::default()
    };

    let record = to_record(&school, &raw);
    assert_eq!(record.source_province, "河北");
    assert_eq!(record.min_score, "660");
    assert_eq!(record.min_rank, "NA");
    assert_eq!(record.major, "NA");
    assert_eq!(record.batch, "NA");
    assert_eq!(record.subject_category, "NA");
    assert_eq!(record.admission_type, "统招");
    assert_eq!(record.admission_code, "10001");
    assert_eq!(record.tier_985, "0");
}
