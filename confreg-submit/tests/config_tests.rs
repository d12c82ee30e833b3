//! Configuration resolution tests for confreg-submit
//!
//! Env-var tests are `#[serial]` since they mutate process state.

use confreg_common::config::load_toml_config;
use confreg_common::{Error, PhoneRequirement};
use confreg_submit::bootstrap::build_services;
use confreg_submit::config::{SubmitConfig, MODULE_NAME, STORE_KEY_ENV, STORE_URL_ENV};
use confreg_submit::fallback::ChannelEncoding;
use confreg_submit::queue_store::MemoryQueueStore;
use serial_test::serial;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn clear_env() {
    std::env::remove_var(STORE_URL_ENV);
    std::env::remove_var(STORE_KEY_ENV);
}

fn example_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("confreg-submit.example.toml")
}

#[test]
#[serial]
fn test_example_config_parses() {
    let config: SubmitConfig = load_toml_config(MODULE_NAME, Some(&example_path())).unwrap();

    config.validate().unwrap();
    assert_eq!(config.phone_requirement, PhoneRequirement::Optional);
    assert_eq!(config.primary.table, "registrations");

    let names: Vec<&str> = config.channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["formspree", "webhook", "google-forms", "emailjs"]);

    let google = &config.channels[2];
    assert!(!google.response_observable);
    match &google.encoding {
        ChannelEncoding::Form { field_map, .. } => {
            assert_eq!(field_map.len(), 8);
            assert_eq!(field_map["first_name"], "entry.1234567890");
        }
        other => panic!("expected form encoding, got {:?}", other),
    }
    assert!(matches!(
        config.channels[3].encoding,
        ChannelEncoding::EmailRelay { .. }
    ));
}

#[test]
#[serial]
fn test_env_overrides_toml_store_settings() {
    clear_env();
    let mut config = SubmitConfig::default();
    config.primary.url = Some("https://toml.example".to_string());
    config.primary.api_key = Some("toml-key".to_string());
    config.primary.request_timeout_ms = 2_500;

    let settings = config.store_settings().unwrap();
    assert_eq!(settings.base_url, "https://toml.example");
    assert_eq!(settings.api_key, "toml-key");
    assert_eq!(settings.request_timeout, Duration::from_millis(2_500));

    std::env::set_var(STORE_URL_ENV, "https://env.example");
    std::env::set_var(STORE_KEY_ENV, "env-key");
    let settings = config.store_settings().unwrap();
    assert_eq!(settings.base_url, "https://env.example");
    assert_eq!(settings.api_key, "env-key");

    clear_env();
}

#[test]
#[serial]
fn test_missing_store_url_is_config_error() {
    clear_env();
    let config = SubmitConfig::default();

    match config.store_settings() {
        Err(Error::Config(msg)) => assert!(msg.contains(STORE_URL_ENV)),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_blank_env_falls_back_to_toml() {
    clear_env();
    std::env::set_var(STORE_URL_ENV, "   ");
    let mut config = SubmitConfig::default();
    config.primary.url = Some("https://toml.example".to_string());
    config.primary.api_key = Some("key".to_string());

    assert_eq!(config.store_settings().unwrap().base_url, "https://toml.example");
    clear_env();
}

#[tokio::test]
#[serial]
async fn test_build_services_wires_configured_channels() {
    clear_env();
    let mut config: SubmitConfig = load_toml_config(MODULE_NAME, Some(&example_path())).unwrap();
    config.primary.api_key = Some("anon".to_string());

    let services = build_services(&config, Arc::new(MemoryQueueStore::new())).unwrap();

    assert_eq!(
        services.pipeline.fallbacks().channel_names(),
        vec!["formspree", "webhook", "google-forms", "emailjs"]
    );
    assert!(services.pipeline.queue().list_pending().await.is_empty());
}

#[test]
fn test_written_config_loads_back_unchanged() {
    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("nested").join("confreg-submit.toml");
    let config: SubmitConfig = load_toml_config(MODULE_NAME, Some(&example_path())).unwrap();

    let written = config.write_file(Some(&target), false).unwrap();
    assert_eq!(written, target);

    let reloaded: SubmitConfig = load_toml_config(MODULE_NAME, Some(&target)).unwrap();
    assert_eq!(reloaded, config);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_existing_config_needs_force() {
    let dir = tempfile::TempDir::new().unwrap();
    let target = dir.path().join("confreg-submit.toml");
    std::fs::write(&target, "channel_timeout_ms = 1\n").unwrap();
    let config = SubmitConfig::default();

    match config.write_file(Some(&target), false) {
        Err(Error::Config(msg)) => assert!(msg.contains("--force")),
        other => panic!("expected config error, got {:?}", other),
    }
    assert_eq!(
        std::fs::read_to_string(&target).unwrap(),
        "channel_timeout_ms = 1\n"
    );

    config.write_file(Some(&target), true).unwrap();
    let reloaded: SubmitConfig = load_toml_config(MODULE_NAME, Some(&target)).unwrap();
    assert_eq!(reloaded, config);
}
