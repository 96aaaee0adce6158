use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crosscap_lib::config::{load_from_path, validate, MatchConfig};
use crosscap_lib::matching::{BucketStrategy, MatchMode};

fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos();
    std::env::temp_dir().join(format!("crosscap-{nanos}-{name}.toml"))
}

#[test]
fn loads_empty_config_with_defaults() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("empty");
    fs::write(&path, "")?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.bucket_strategy, BucketStrategy::Auto);
    assert_eq!(cfg.score_threshold, 0.60);
    assert_eq!(cfg.match_mode, MatchMode::OneToOne);
    assert!(!cfg.merge_five_tuple);
    assert!(!cfg.sampling.enabled);
    assert_eq!(cfg.sampling.threshold, 1000);
    assert_eq!(cfg.sampling.rate, 0.5);

    fs::remove_file(&path).ok();
    Ok(())
}

#[test]
fn loads_full_config() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = tmp_path("full");
    let toml = r#"
bucket_strategy = "port"
score_threshold = 0.75
match_mode = "one-to-many"
merge_five_tuple = true

[sampling]
enabled = true
threshold = 500
rate = 0.25
"#;
    fs::write(&path, toml)?;

    let cfg = load_from_path(&path)?;
    assert_eq!(cfg.bucket_strategy, BucketStrategy::Port);
    assert_eq!(cfg.score_threshold, 0.75);
    assert_eq!(cfg.match_mode, MatchMode::OneToMany);
    assert!(cfg.merge_five_tuple);
    assert!(cfg.sampling.enabled);
    assert_eq!(cfg.sampling.threshold, 500);
    assert_eq!(cfg.sampling.rate, 0.25);

    fs::remove_file(&path).ok();
    Ok(())
}

#[test]
fn rejects_threshold_outside_unit_interval() {
    let mut cfg = MatchConfig::default();
    cfg.score_threshold = 1.5;
    assert!(validate(&cfg).is_err());

    cfg.score_threshold = -0.1;
    assert!(validate(&cfg).is_err());

    cfg.score_threshold = 1.0;
    assert!(validate(&cfg).is_ok());
}

#[test]
fn rejects_bad_sampling_settings() {
    let mut cfg = MatchConfig::default();
    cfg.sampling.rate = 0.0;
    assert!(validate(&cfg).is_err());

    cfg.sampling.rate = 1.5;
    assert!(validate(&cfg).is_err());

    cfg.sampling.rate = 0.5;
    cfg.sampling.threshold = 0;
    assert!(validate(&cfg).is_err());
}

#[test]
fn load_rejects_invalid_values_before_any_work() {
    let path = tmp_path("invalid");
    fs::write(&path, "score_threshold = 2.0\n").unwrap();

    assert!(load_from_path(&path).is_err());
    fs::remove_file(&path).ok();
}

#[test]
fn missing_file_is_a_config_error() {
    let err = load_from_path("/nonexistent/crosscap.toml").unwrap_err();
    assert!(matches!(err, crosscap_lib::CrosscapError::Config(_)));
}
