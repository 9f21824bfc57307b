// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use parley::config::Settings;
use parley::error::ParleyError;
use tempfile::TempDir;

#[test]
fn test_settings_default_values() {
    let settings = Settings::default();

    assert_eq!(settings.provider.base_url, "https://api.openai.com/v1");
    assert_eq!(settings.provider.api_key_env, "PARLEY_API_KEY");
    assert_eq!(settings.defaults.model, "llama3-3-70b");
    assert!((settings.defaults.temperature - 0.7).abs() < f32::EPSILON);
    assert!((settings.defaults.top_p - 1.0).abs() < f32::EPSILON);
    assert!(settings.defaults.tools_enabled);
    assert_eq!(settings.defaults.placeholder_title, "New Chat");
    assert!(settings.validate().is_ok());
}

#[test]
fn test_settings_title_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.title.free_max_chars, 50);
    assert_eq!(settings.title.prompt_max_chars, 500);
    assert_eq!(settings.title.max_tokens, 15);
    assert!(settings.title.model.is_none());
    assert_eq!(
        settings.title.effective_model(&settings.defaults),
        "llama3-3-70b"
    );
}

#[test]
fn test_settings_api_key_priority() {
    // Custom env var name to avoid test pollution
    let mut settings = Settings::default();
    settings.provider.api_key_env = "PARLEY_TEST_API_KEY_31337".to_string();
    settings.provider.api_key = Some("config-key".to_string());

    std::env::remove_var("PARLEY_TEST_API_KEY_31337");
    assert_eq!(settings.get_api_key(), Some("config-key".to_string()));

    std::env::set_var("PARLEY_TEST_API_KEY_31337", "env-key");
    assert_eq!(settings.get_api_key(), Some("env-key".to_string()));

    std::env::remove_var("PARLEY_TEST_API_KEY_31337");
}

#[test]
fn test_settings_deserialization_fills_missing_sections() {
    let json = r#"{
        "defaults": {
            "model": "gpt-4o-mini",
            "temperature": 0.5
        },
        "billing": { "product_name": "Pro" }
    }"#;

    let settings: Settings = serde_json::from_str(json).expect("Should deserialize from JSON");

    assert_eq!(settings.defaults.model, "gpt-4o-mini");
    assert_eq!(settings.defaults.temperature, 0.5);
    assert!(settings.defaults.tools_enabled);
    assert_eq!(settings.billing.product_name.as_deref(), Some("Pro"));
    assert_eq!(settings.title.free_max_chars, 50);
}

#[test]
fn test_load_from_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&dir.path().join("settings.json")).unwrap();
    assert_eq!(settings.defaults.model, "llama3-3-70b");
}

#[test]
fn test_load_migrates_legacy_model_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"defaults": {"default_model": "legacy-model"}}"#).unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.defaults.model, "legacy-model");
}

#[test]
fn test_save_preserves_unknown_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"experimental": {"flag": true}, "defaults": {"model": "old", "extra": 1}}"#,
    )
    .unwrap();

    let mut settings = Settings::load_from(&path).unwrap();
    settings.defaults.model = "new-model".to_string();
    settings.save_to(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["experimental"]["flag"], true);
    assert_eq!(raw["defaults"]["extra"], 1);
    assert_eq!(raw["defaults"]["model"], "new-model");

    let reloaded = Settings::load_from(&path).unwrap();
    assert_eq!(reloaded.defaults.model, "new-model");
}

#[test]
fn test_load_rejects_invalid_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        Settings::load_from(&path),
        Err(ParleyError::Json(_))
    ));
}

#[test]
fn test_validate_rejects_out_of_range_values() {
    let mut settings = Settings::default();
    settings.defaults.temperature = 3.5;
    assert!(matches!(settings.validate(), Err(ParleyError::Config(_))));

    let mut settings = Settings::default();
    settings.defaults.model = "  ".to_string();
    assert!(matches!(settings.validate(), Err(ParleyError::Config(_))));

    let mut settings = Settings::default();
    settings.title.free_max_chars = 0;
    assert!(matches!(settings.validate(), Err(ParleyError::Config(_))));
}
