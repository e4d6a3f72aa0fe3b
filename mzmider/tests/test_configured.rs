use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};

use mzmider::{ArgLabelingMetric, ArgOverlapPolicy, MZMider};

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_labeling_configured() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("labeling_test.mid.tsv");

    let mut config = Figment::new();
    config = config.merge(Toml::file_exact("tests/data/labeling_test.toml"));
    config = config.merge(Serialized::default("output_file", &output));
    let driver: MZMider = config.extract().unwrap();
    assert_eq!(driver.overlap_policy, ArgOverlapPolicy::Nearest);
    assert_eq!(driver.labeling_metric, ArgLabelingMetric::ChannelFraction);
    assert_eq!(driver.write_buffer_size, mzmider::BUFFER_SIZE);
    assert_eq!(driver.q_value_threshold, 0.01);

    driver.main().unwrap();

    let text = std::fs::read_to_string(&output).unwrap();
    let rows: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();
    assert_eq!(rows.len(), 6);
    let labeling = rows[0].iter().position(|h| *h == "labeling").unwrap();
    let fraction_2 = rows[0].iter().position(|h| *h == "fraction_2").unwrap();
    // The labeling metric reports the requested isotopologue's share
    assert_eq!(rows[1][labeling], rows[1][fraction_2]);
}

#[test]
fn test_unique_only_configured() {
    let driver: MZMider = Figment::new()
        .merge(Toml::file_exact("tests/data/labeling_test.toml"))
        .merge(Toml::string("unique_only = true"))
        .extract()
        .unwrap();
    assert!(driver.unique_only);
    assert!(!MZMider::default().unique_only);
}
