//! Secret resolution for confreg-ticket

use confreg_common::Error;
use confreg_ticket::config::{TicketConfig, EMAIL_KEY_ENV, SERVICE_KEY_ENV, STORE_URL_ENV};
use serial_test::serial;

fn clear_env() {
    for var in [STORE_URL_ENV, SERVICE_KEY_ENV, EMAIL_KEY_ENV] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_secrets_come_from_environment() {
    clear_env();
    std::env::set_var(STORE_URL_ENV, "https://store.example");
    std::env::set_var(SERVICE_KEY_ENV, "service-role");
    std::env::set_var(EMAIL_KEY_ENV, "re_env");

    let config = TicketConfig::default();
    let store = config.store_settings().unwrap();
    assert_eq!(store.base_url, "https://store.example");
    assert_eq!(store.api_key, "service-role");
    assert_eq!(config.email_api_key().unwrap(), "re_env");

    clear_env();
}

#[test]
#[serial]
fn test_toml_secrets_used_without_environment() {
    clear_env();
    let mut config = TicketConfig::default();
    config.store.url = Some("https://toml.example".to_string());
    config.store.service_key = Some("toml-service".to_string());
    config.email.api_key = Some("re_toml".to_string());

    assert_eq!(config.store_settings().unwrap().api_key, "toml-service");
    assert_eq!(config.email_api_key().unwrap(), "re_toml");
}

#[test]
#[serial]
fn test_missing_email_key_names_the_variable() {
    clear_env();
    match TicketConfig::default().email_api_key() {
        Err(Error::Config(msg)) => assert!(msg.contains(EMAIL_KEY_ENV)),
        other => panic!("expected config error, got {:?}", other),
    }
}
