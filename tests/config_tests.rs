//! Agent configuration loaded from TOML files.

use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

use agui_relay::agent::{AgentFileConfig, OverridableProperty};
use agui_relay::error::RelayError;
use agui_relay::models::{ModelSpecifier, ProviderKey};
use agui_relay::types::ToolChoice;

fn write_config(raw: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(raw.as_bytes()).unwrap();
    file
}

#[test]
fn loads_agent_config_from_file() {
    let file = write_config(
        r#"
model = "anthropic/claude-sonnet-4.5"
prompt = "Be brief."
max_steps = 4
temperature = 0.2
stop_sequences = ["END"]
tool_choice = "required"
overridable_properties = ["temperature", "stopSequences", "model"]
forward_developer_messages = true
"#,
    );

    let config = AgentFileConfig::from_file(file.path()).unwrap().into_config().unwrap();

    let ModelSpecifier::Id(model) = &config.model else {
        panic!("expected a model id");
    };
    assert_eq!(model.provider, ProviderKey::Anthropic);
    assert_eq!(model.model_id, "claude-sonnet-4.5");
    assert_eq!(config.prompt.as_deref(), Some("Be brief."));
    assert_eq!(config.max_steps, 4);
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.temperature, Some(0.2));
    assert_eq!(config.stop_sequences, Some(vec!["END".to_string()]));
    assert_eq!(config.tool_choice, Some(ToolChoice::Mode(agui_relay::types::ToolChoiceMode::Required)));
    assert!(config.can_override(OverridableProperty::StopSequences));
    assert!(config.can_override(OverridableProperty::Model));
    assert!(!config.can_override(OverridableProperty::TopP));
    assert!(config.forward_developer_messages);
    assert!(!config.forward_system_messages);
}

#[test]
fn minimal_file_uses_defaults() {
    let config = AgentFileConfig::from_toml_str(r#"model = "openai:gpt-4o""#)
        .unwrap()
        .into_config()
        .unwrap();

    assert_eq!(config.max_steps, 1);
    assert!(config.overridable_properties.is_empty());
    assert!(config.tools.is_empty());
    assert!(config.tool_providers.is_empty());
}

#[test]
fn unknown_keys_are_rejected() {
    let err = AgentFileConfig::from_toml_str("model = \"openai/gpt-4o\"\ntemprature = 0.5").unwrap_err();
    assert!(matches!(err, RelayError::Configuration(msg) if msg.contains("temprature")));
}

#[test]
fn unknown_overridable_property_is_rejected() {
    let err = AgentFileConfig::from_toml_str("model = \"openai/gpt-4o\"\noverridable_properties = [\"apiKey\"]")
        .unwrap_err();
    assert!(matches!(err, RelayError::Configuration(_)));
}

#[test]
fn bad_model_string_fails_conversion() {
    let file = AgentFileConfig::from_toml_str(r#"model = "gpt-4o""#).unwrap();
    assert!(matches!(file.into_config(), Err(RelayError::Configuration(_))));
}

#[test]
fn missing_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AgentFileConfig::from_file(dir.path().join("agent.toml")).unwrap_err();
    assert!(matches!(err, RelayError::Configuration(msg) if msg.contains("agent.toml")));
}

#[test]
fn debug_output_hides_the_api_key() {
    let config = AgentFileConfig::from_toml_str("model = \"openai/gpt-4o\"\napi_key = \"sk-very-secret\"")
        .unwrap()
        .into_config()
        .unwrap();
    assert!(!format!("{config:?}").contains("sk-very-secret"));
}

#[cfg(feature = "mcp")]
mod mcp {
    use super::*;
    use agui_relay::agent::{AgUiEvent, BuiltInAgent, RunAgentInput};

    #[test]
    fn sse_mcp_servers_are_rejected_at_load() {
        let err = AgentFileConfig::from_toml_str(
            r#"
model = "openai/gpt-4o"

[[mcp_servers]]
type = "sse"
url = "http://127.0.0.1:1/sse"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[tokio::test]
    async fn unreachable_mcp_server_is_reported_as_run_error() {
        let mut config = AgentFileConfig::from_toml_str(
            r#"
model = "openai/gpt-4o"
api_key = "sk-test"

[[mcp_servers]]
type = "http"
url = "http://127.0.0.1:1/mcp"
"#,
        )
        .unwrap()
        .into_config()
        .unwrap();
        config.max_retries = 0;
        assert_eq!(config.tool_providers.len(), 1);

        let (events, outcome) = BuiltInAgent::new(config).run(RunAgentInput::new("t", "r")).collect().await;

        assert!(matches!(events.last(), Some(AgUiEvent::RunError { .. })));
        assert!(outcome.is_err());
    }
}
