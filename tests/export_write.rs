use serde_json::json;

use stimline::settings::ExportSettings;
use stimline::{
    ExportFormat, ExtractorResult, FeatureSet, StimIdentity, merge_results, write_table,
};

fn sample_table() -> stimline::FeatureTable {
    let mut first = FeatureSet::new();
    first.insert("label", json!("walking"));
    first.insert("score", json!(0.9));
    let mut second = FeatureSet::new();
    second.insert("score", json!(0.4));

    merge_results(&[
        ExtractorResult::new(
            first,
            StimIdentity {
                onset: Some(0.0),
                duration: Some(1.0),
                index: 0,
            },
            "labels",
        ),
        ExtractorResult::new(
            second,
            StimIdentity {
                onset: Some(1.0),
                duration: Some(1.0),
                index: 1,
            },
            "labels",
        ),
    ])
}

#[tokio::test(flavor = "multi_thread")]
async fn tsv_export_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.tsv");

    let settings = ExportSettings::default();
    write_table(&path, &sample_table(), &settings).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "onset\tduration\tlabel\tscore");
    assert_eq!(lines[1], "0\t1\twalking\t0.9");
    assert_eq!(lines[2], "1\t1\tn/a\t0.4");
}

#[tokio::test(flavor = "multi_thread")]
async fn json_export_keeps_the_column_union() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.json");

    let settings = ExportSettings {
        format: ExportFormat::Json,
        pretty: false,
        ..ExportSettings::default()
    };
    write_table(&path, &sample_table(), &settings).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(value["columns"], json!(["label", "score"]));
    assert_eq!(value["rows"][1]["values"].get("label"), None);
    assert_eq!(value["rows"][1]["values"]["score"], json!(0.4));
}
