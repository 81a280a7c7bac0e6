use std::io::Write;
use std::time::Duration;

use hosunlock_config::{AppConfig, ConfigOverrides, Error, ThresholdKey, TokenInfo};
use pretty_assertions::assert_eq;

fn valid_config() -> AppConfig {
    AppConfig {
        tokens: vec![TokenInfo::new("secret-one", 1), TokenInfo::new("secret-two", 2)],
        token_shifts: vec![0, 150],
        ..AppConfig::default()
    }
}

#[test]
fn test_default_config_is_invalid() {
    let config = AppConfig::default();

    assert!(matches!(config.validate(), Err(Error::InvalidSecret(1))));
}

#[test]
fn test_valid_config_passes() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_duplicate_shifts_rejected() {
    let config = AppConfig {
        token_shifts: vec![0, 100, 100],
        ..valid_config()
    };

    assert!(matches!(config.validate(), Err(Error::DuplicateShift(100))));
}

#[test]
fn test_duplicate_index_rejected() {
    let config = AppConfig {
        tokens: vec![TokenInfo::new("a", 1), TokenInfo::new("b", 1)],
        ..valid_config()
    };

    assert!(matches!(config.validate(), Err(Error::DuplicateIndex(1))));
}

#[test]
fn test_zero_index_rejected() {
    let config = AppConfig {
        tokens: vec![TokenInfo::new("a", 0)],
        ..valid_config()
    };

    assert!(matches!(config.validate(), Err(Error::InvalidIndex(0))));
}

#[test]
fn test_empty_collections_rejected() {
    let no_tokens = AppConfig {
        tokens: vec![],
        ..valid_config()
    };
    let no_shifts = AppConfig {
        token_shifts: vec![],
        ..valid_config()
    };

    assert!(matches!(no_tokens.validate(), Err(Error::NoTokens)));
    assert!(matches!(no_shifts.validate(), Err(Error::NoShifts)));
}

#[test]
fn test_threshold_keys_cross_product() {
    let keys = valid_config().threshold_keys();

    assert_eq!(
        keys,
        vec![
            ThresholdKey::new(1, "secret-one", 1, 0),
            ThresholdKey::new(1, "secret-one", 2, 150),
            ThresholdKey::new(2, "secret-two", 1, 0),
            ThresholdKey::new(2, "secret-two", 2, 150),
        ]
    );
}

#[test]
fn test_parses_pascal_case_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "Tokens": [{{ "Token": "abc", "Index": 1 }}],
            "TokenShifts": [-200, 0, 300],
            "AutoRunOnStart": true,
            "MaxAutoRetries": 7,
            "MaxApiRetries": 2,
            "ApiRetryWaitTimeMs": 250,
            "MultiplyApiRetryWaitTimeByAttempt": false
        }}"#
    )
    .unwrap();

    let config = AppConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.tokens, vec![TokenInfo::new("abc", 1)]);
    assert_eq!(config.token_shifts, vec![-200, 0, 300]);
    assert!(config.auto_run_on_start);
    assert_eq!(config.max_auto_retries(), 7);

    let policy = config.retry_policy();
    assert_eq!(policy.max_retries(), 2);
    assert_eq!(policy.base_delay(), Duration::from_millis(250));
    assert!(!policy.multiply_by_attempt());
}

#[test]
fn test_missing_fields_take_defaults() {
    let config: AppConfig =
        serde_json::from_str(r#"{ "Tokens": [{ "Token": "abc", "Index": 1 }] }"#).unwrap();

    assert_eq!(config.token_shifts, vec![0]);
    assert_eq!(config.max_auto_retries(), 5);
    assert_eq!(config.max_api_retries(), 3);
    assert_eq!(config.api_retry_wait(), Duration::from_millis(100));
    assert!(config.multiply_api_retry_wait_time_by_attempt);
}

#[test]
fn test_out_of_range_values_are_clamped() {
    let config = AppConfig {
        max_auto_retries: 0,
        max_api_retries: 50,
        api_retry_wait_time_ms: 5000,
        ..valid_config()
    };

    assert_eq!(config.max_auto_retries(), 1);
    assert_eq!(config.max_api_retries(), 10);
    assert_eq!(config.api_retry_wait(), Duration::from_millis(1000));
}

#[test]
fn test_missing_file_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_or_default(dir.path().join("missing.json")).unwrap();

    assert_eq!(config.tokens, AppConfig::default().tokens);
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();

    assert!(matches!(
        AppConfig::load_or_default(file.path()),
        Err(Error::Json(_))
    ));
}

#[test]
fn test_overrides_apply() {
    let mut config = valid_config();
    let overrides = ConfigOverrides {
        auto_run: true,
        max_auto_retries: Some(10),
        max_api_retries: Some(0),
        api_retry_wait_ms: Some(20),
        fixed_retry_wait: true,
        ..ConfigOverrides::default()
    };

    config.apply_overrides(&overrides).unwrap();

    assert!(config.auto_run_on_start);
    assert_eq!(config.max_auto_retries(), 10);
    assert_eq!(config.max_api_retries(), 0);
    assert_eq!(config.api_retry_wait(), Duration::from_millis(20));
    assert!(!config.multiply_api_retry_wait_time_by_attempt);
}

#[test]
fn test_override_out_of_range_rejected() {
    let mut config = valid_config();
    let overrides = ConfigOverrides {
        max_auto_retries: Some(400),
        ..ConfigOverrides::default()
    };

    let err = config.apply_overrides(&overrides).unwrap_err();

    assert!(matches!(
        err,
        Error::OutOfRange {
            name: "max-retries",
            value: 400,
            min: 1,
            max: 365
        }
    ));
    assert_eq!(config.max_auto_retries(), 5);
}
