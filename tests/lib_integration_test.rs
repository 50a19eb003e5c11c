//! Integration tests for the library public API

use fourth_and_short::{
    decision::DecisionPolicy,
    servers::DecisionApiConfig,
    DecisionServiceError, GameState, Result, ValidationError, DESCRIPTION, FEATURE_SCHEMA_VERSION,
    NAME, VERSION,
};

#[test]
fn test_library_metadata() {
    assert!(!VERSION.is_empty());
    assert_eq!(NAME, "fourth_and_short");
    assert!(!DESCRIPTION.is_empty());
    assert_eq!(FEATURE_SCHEMA_VERSION, 1);
}

#[test]
fn test_error_kinds() {
    let validation = DecisionServiceError::from(ValidationError::new("down", "0 is outside 1..=4"));
    assert_eq!(validation.kind(), "validation_error");
    assert!(validation.to_string().contains("down"));

    let unavailable = DecisionServiceError::ModelUnavailable {
        model: "fourth_down".to_string(),
    };
    assert_eq!(unavailable.kind(), "model_unavailable");

    let no_prior = DecisionServiceError::NoPriorVersion {
        model: "fourth_down".to_string(),
    };
    assert_eq!(no_prior.kind(), "no_prior_version");
}

#[test]
fn test_result_type_alias() {
    let success: Result<i32> = Ok(42);
    assert_eq!(success.unwrap(), 42);

    let failure: Result<GameState> = GameState::builder(4, 12, 10).build().map_err(Into::into);
    assert!(matches!(failure, Err(DecisionServiceError::Validation(ref e)) if e.field == "distance"));
}

#[test]
fn test_server_configs() {
    // Test DecisionApiConfig default
    let api_config = DecisionApiConfig::default();
    assert_eq!(api_config.port, 8080);
    assert_eq!(api_config.host, "0.0.0.0");

    let policy = DecisionPolicy::default();
    assert_eq!(policy.confidence_floor, 0.5);
}

#[test]
fn test_out_of_range_settings_are_rejected() {
    let month = chrono::Duration::days(30);
    assert!(matches!(
        DecisionPolicy::new(f64::NAN, month),
        Err(DecisionServiceError::InvalidConfig(_))
    ));
    assert!(DecisionPolicy::new(0.7, month).is_ok());

    let api_config = DecisionApiConfig {
        max_bulk_items: 0,
        ..DecisionApiConfig::default()
    };
    assert!(matches!(
        api_config.validate(),
        Err(DecisionServiceError::InvalidConfig(_))
    ));
    assert!(DecisionApiConfig::default().validate().is_ok());
}
