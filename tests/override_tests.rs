//! Forwarded-property overrides as seen by the provider.

mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use agui_relay::agent::{AgentConfig, BuiltInAgent, OverridableProperty, RunAgentInput};
use agui_relay::types::{GenerationSettings, StreamPart, ToolChoice};

use common::MockProvider;

async fn settings_for(mut config: AgentConfig, model: &std::sync::Arc<MockProvider>, forwarded: Value) -> GenerationSettings {
    config.temperature = Some(0.7);
    config.stop_sequences = Some(vec!["###".into()]);
    let mut input = RunAgentInput::new("t", "r");
    input.forwarded_props = Some(forwarded);

    let (_, outcome) = BuiltInAgent::new(config).run(input).collect().await;
    outcome.expect("run should succeed");
    model.last_request().settings
}

fn scripted() -> std::sync::Arc<MockProvider> {
    let model = MockProvider::new();
    model.queue(vec![StreamPart::text_delta("ok")]);
    model
}

#[tokio::test]
async fn fields_outside_the_allow_list_are_ignored() {
    let model = scripted();
    let mut config = common::config(model.clone());
    config.overridable_properties = vec![OverridableProperty::TopP];

    let settings = settings_for(config, &model, json!({"temperature": 0.1, "topP": 0.3})).await;

    assert_eq!(settings.temperature, Some(0.7));
    assert_eq!(settings.top_p, Some(0.3));
}

#[tokio::test]
async fn stop_sequences_must_be_an_array_of_strings() {
    for bad in [json!("###"), json!(["a", 1]), json!({"0": "a"})] {
        let model = scripted();
        let mut config = common::config(model.clone());
        config.overridable_properties = vec![OverridableProperty::StopSequences];

        let settings = settings_for(config, &model, json!({ "stopSequences": bad })).await;
        assert_eq!(settings.stop_sequences, Some(vec!["###".to_string()]));
    }

    let model = scripted();
    let mut config = common::config(model.clone());
    config.overridable_properties = vec![OverridableProperty::StopSequences];
    let settings = settings_for(config, &model, json!({"stopSequences": ["END"]})).await;
    assert_eq!(settings.stop_sequences, Some(vec!["END".to_string()]));
}

#[tokio::test]
async fn tool_choice_accepts_literals_and_specific_tools() {
    let model = scripted();
    let mut config = common::config(model.clone());
    config.overridable_properties = vec![OverridableProperty::ToolChoice];
    let settings = settings_for(config, &model, json!({"toolChoice": {"type": "tool", "toolName": "search"}})).await;
    assert_eq!(settings.tool_choice, Some(ToolChoice::tool("search")));

    let model = scripted();
    let mut config = common::config(model.clone());
    config.overridable_properties = vec![OverridableProperty::ToolChoice];
    let settings = settings_for(config, &model, json!({"toolChoice": "maybe"})).await;
    assert_eq!(settings.tool_choice, None);
}

#[tokio::test]
async fn prompt_override_replaces_configured_prompt() {
    let model = scripted();
    let mut config = common::config(model.clone());
    config.prompt = Some("configured".into());
    config.overridable_properties = vec![OverridableProperty::Prompt];
    let mut input = RunAgentInput::new("t", "r");
    input.forwarded_props = Some(json!({"prompt": "forwarded"}));

    let (_, outcome) = BuiltInAgent::new(config).run(input).collect().await;
    outcome.unwrap();

    assert_eq!(model.last_request().messages[0].text(), "forwarded");
}

#[tokio::test]
async fn invalid_model_override_fails_setup() {
    let model = scripted();
    let mut config = common::config(model.clone());
    config.overridable_properties = vec![OverridableProperty::Model];
    let mut input = RunAgentInput::new("t", "r");
    input.forwarded_props = Some(json!({"model": "not-a-model"}));

    let (events, outcome) = BuiltInAgent::new(config).run(input).collect().await;

    assert_eq!(common::kinds(&events), vec!["RUN_STARTED"]);
    assert!(outcome.is_err());
    assert!(model.requests().is_empty());
}

#[test]
fn can_override_reflects_the_allow_list() {
    let model = MockProvider::new();
    let mut config = common::config(model);
    config.overridable_properties = vec![OverridableProperty::Seed];
    let agent = BuiltInAgent::new(config);

    assert!(agent.can_override(OverridableProperty::Seed));
    assert!(!agent.can_override(OverridableProperty::Model));
}
