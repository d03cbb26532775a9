//! Context composition integration tests
//!
//! Templates instantiated under a prefix, placeholder resolution across
//! templates, overrides and context files.

use contract_guardian::config::ClientConfig;
use contract_guardian::context::{
    initialize_context, load_context_file, save_context_file, State, TemplateRegistry,
};
use contract_guardian::GuardianError;

const TOKEN_TEMPLATES: [&str; 5] = ["asset_type", "vetting", "guardian", "token_issuer", "token_object"];

fn token_state() -> State {
    State::new(ClientConfig::default())
}

#[test]
fn test_identity_flows_into_every_template() {
    let registry = TemplateRegistry::builtin().unwrap();
    let state = token_state();
    let context = initialize_context(
        &state,
        None,
        "token.t1",
        &registry,
        &TOKEN_TEMPLATES,
        [("identity", toml::Value::from("alice"))],
    )
    .unwrap();

    for key in TOKEN_TEMPLATES {
        let identity = context.get_context(key).unwrap().require_str("identity").unwrap();
        assert_eq!(identity, "alice", "identity of {}", key);
    }

    let token_object = context.get_context("token_object").unwrap();
    assert_eq!(
        token_object.get_context("data_guardian_context").unwrap().path(),
        "token.t1.guardian"
    );
    assert_eq!(
        token_object.get_str("eservice_group").unwrap().as_deref(),
        Some("default")
    );
}

#[test]
fn test_overrides_reapply_without_reinstantiating() {
    let registry = TemplateRegistry::builtin().unwrap();
    let state = token_state();
    let context = initialize_context(
        &state,
        None,
        "token.t1",
        &registry,
        &TOKEN_TEMPLATES,
        [("identity", toml::Value::from("alice"))],
    )
    .unwrap();
    context.set("asset_type.name", "tickets").unwrap();

    let context = initialize_context(
        &state,
        None,
        "token.t1",
        &registry,
        &TOKEN_TEMPLATES,
        [("identity", toml::Value::from("bob"))],
    )
    .unwrap();

    assert_eq!(context.require_str("asset_type.name").unwrap(), "tickets");
    assert_eq!(context.require_str("guardian.identity").unwrap(), "bob");
}

#[test]
fn test_missing_identity_is_resolution_error() {
    let registry = TemplateRegistry::builtin().unwrap();
    let state = token_state();
    let context = initialize_context(
        &state,
        None,
        "token.t2",
        &registry,
        &["token_issuer"],
        std::iter::empty::<(&str, toml::Value)>(),
    )
    .unwrap();

    let result = context.get_context("token_issuer").unwrap().get_str("identity");
    assert!(matches!(result, Err(GuardianError::Resolution { .. })));
}

#[test]
fn test_context_file_keeps_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("token.toml");
    let registry = TemplateRegistry::builtin().unwrap();

    let state = token_state();
    initialize_context(
        &state,
        None,
        "token.t1",
        &registry,
        &TOKEN_TEMPLATES,
        [("identity", toml::Value::from("alice"))],
    )
    .unwrap();
    save_context_file(&state, &file, "token.t1").unwrap();

    let text = std::fs::read_to_string(&file).unwrap();
    assert!(text.contains("${..identity}"));
    assert!(text.contains("@{..guardian}"));

    // a fresh process picks up where the file left off
    let reloaded = token_state();
    load_context_file(&reloaded, &file, "token.t1").unwrap();
    let context = initialize_context(
        &reloaded,
        None,
        "token.t1",
        &registry,
        &["exchange"],
        std::iter::empty::<(&str, toml::Value)>(),
    )
    .unwrap();
    assert!(!context.has_key("exchange"));
    assert_eq!(context.require_str("token_object.identity").unwrap(), "alice");
}
