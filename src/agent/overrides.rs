//! Forwarded-property overrides gated by the agent's allow-list.
//!
//! A forwarded value replaces the configured one only when its property is
//! allow-listed and the value has the expected shape. Anything else is
//! ignored and the configured value stays in effect.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use crate::error::Result;
use crate::models::{LanguageModel, ModelSpecifier};
use crate::types::{GenerationSettings, ToolChoice};

use super::config::AgentConfig;

/// Run parameters a caller may override through `forwardedProps`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OverridableProperty {
    Model,
    ToolChoice,
    MaxOutputTokens,
    Temperature,
    TopP,
    TopK,
    PresencePenalty,
    FrequencyPenalty,
    StopSequences,
    Seed,
    MaxRetries,
    Prompt,
}

impl OverridableProperty {
    /// Key looked up in `forwardedProps`.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Effective parameters of one run.
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub model: ModelSpecifier,
    pub settings: GenerationSettings,
    pub max_retries: u32,
    pub prompt: Option<String>,
}

impl RunParameters {
    fn from_config(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            settings: config.generation_settings(),
            max_retries: config.max_retries,
            prompt: config.prompt.clone(),
        }
    }
}

/// Merge forwarded overrides into the configured parameters.
///
/// Fails only when an allowed model override names an unparseable model.
pub fn resolve(config: &AgentConfig, forwarded: Option<&Value>) -> Result<RunParameters> {
    let mut params = RunParameters::from_config(config);
    let Some(props) = forwarded.and_then(Value::as_object) else {
        return Ok(params);
    };

    for property in OverridableProperty::iter() {
        let Some(value) = props.get(property.as_str()) else {
            continue;
        };
        if !config.can_override(property) {
            debug!(property = %property, "forwarded override not allowed, ignoring");
            continue;
        }
        if !apply(&mut params, property, value)? {
            debug!(property = %property, value = %value, "forwarded override has invalid shape, ignoring");
        }
    }

    Ok(params)
}

/// Returns whether the value was applied.
fn apply(params: &mut RunParameters, property: OverridableProperty, value: &Value) -> Result<bool> {
    let settings = &mut params.settings;
    let applied = match property {
        OverridableProperty::Model => match value.as_str() {
            Some(spec) => {
                params.model = ModelSpecifier::Id(spec.parse::<LanguageModel>()?);
                true
            }
            None => false,
        },
        OverridableProperty::ToolChoice => set(
            &mut settings.tool_choice,
            serde_json::from_value::<ToolChoice>(value.clone()).ok(),
        ),
        OverridableProperty::MaxOutputTokens => set(&mut settings.max_tokens, as_u32(value)),
        OverridableProperty::Temperature => set(&mut settings.temperature, value.as_f64()),
        OverridableProperty::TopP => set(&mut settings.top_p, value.as_f64()),
        OverridableProperty::TopK => set(&mut settings.top_k, as_u32(value)),
        OverridableProperty::PresencePenalty => set(&mut settings.presence_penalty, value.as_f64()),
        OverridableProperty::FrequencyPenalty => {
            set(&mut settings.frequency_penalty, value.as_f64())
        }
        OverridableProperty::StopSequences => {
            set(&mut settings.stop_sequences, string_array(value))
        }
        OverridableProperty::Seed => set(&mut settings.seed, value.as_u64()),
        OverridableProperty::MaxRetries => match as_u32(value) {
            Some(retries) => {
                params.max_retries = retries;
                true
            }
            None => false,
        },
        OverridableProperty::Prompt => set(&mut params.prompt, value.as_str().map(str::to_string)),
    };
    Ok(applied)
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
