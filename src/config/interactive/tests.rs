use super::*;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    std::fs::write(temp_dir.path().join("config.toml"), "[retry\nbroken")
        .expect("should write config");

    let config = load_existing_config(temp_dir.path());
    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.openai, OpenAiConfig::default());
}

#[test]
fn api_key_masking() {
    assert_eq!(mask_api_key(None), "not set");
    assert_eq!(mask_api_key(Some("short")), "****");
    assert_eq!(mask_api_key(Some("sk-abcdefgh1234")), "****1234");
}

#[test]
fn retrieval_setter_validates_k() {
    let mut retrieval = RetrievalConfig::default();
    assert!(set_retrieval(&mut retrieval, 12, true).is_ok());
    assert_eq!(retrieval.default_k, 12);
    assert!(retrieval.hyde);

    assert!(set_retrieval(&mut retrieval, 0, false).is_err());
    assert_eq!(retrieval.default_k, 12);
}

#[test]
fn non_empty_validator() {
    assert!(non_empty(&"value".to_string()).is_ok());
    assert!(non_empty(&"   ".to_string()).is_err());
}

#[test]
fn unreachable_service_is_reported() {
    let openai = OpenAiConfig {
        base_url: "http://127.0.0.1:9/v1".to_string(),
        ..OpenAiConfig::default()
    };
    assert!(!test_openai_connection(&openai, Some("sk-test")));
}
