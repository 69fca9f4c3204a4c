use std::io::Write;
use std::time::Duration;

use notekeeper::{AppConfig, ConfigLoadError, LogFormat};
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn full_file_round_trips_every_section() {
    let file = write_config(
        r#"
version: "1.0"
name: "ci"
logging:
  level: "debug"
  format: "json"
  with_target: true
retry:
  max_attempts: 5
  initial_delay: 100
  max_delay: 500
  backoff_factor: 3.0
  jitter: true
circuit_breaker:
  failure_threshold: 3
  reset_timeout: 100
  half_open_max_attempts: 2
events:
  buffer_size: 8
"#,
    );

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.name.as_deref(), Some("ci"));
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.logging.with_target);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.max_delay, Duration::from_millis(500));
    assert_eq!(config.retry.backoff_factor, 3.0);
    assert!(config.retry.jitter);
    assert_eq!(config.circuit_breaker.reset_timeout, Duration::from_millis(100));
    assert_eq!(config.circuit_breaker.half_open_max_attempts, 2);
    assert_eq!(config.events.buffer_size, 8);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigLoadError::FileRead(_)));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let file = write_config("version: \"1.0\"\nretry: [1, 2\n");
    let err = AppConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigLoadError::YamlParse(_)));
}

#[test]
fn zero_values_are_rejected() {
    for (yaml, needle) in [
        ("version: \"1\"\nretry:\n  max_attempts: 0\n", "retry"),
        (
            "version: \"1\"\ncircuit_breaker:\n  failure_threshold: 0\n",
            "circuit_breaker",
        ),
        ("version: \"1\"\nevents:\n  buffer_size: 0\n", "buffer_size"),
    ] {
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(
            matches!(&err, ConfigLoadError::Validation(msg) if msg.contains(needle)),
            "{yaml}: {err}"
        );
    }
}
