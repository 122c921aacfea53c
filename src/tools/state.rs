//! Reserved state-sync tools injected into every run.
//!
//! Both execute locally and echo their input; the run's event translation
//! turns their results into `STATE_SNAPSHOT` / `STATE_DELTA` events.

use std::sync::Arc;

use serde_json::json;

use crate::schema::ValidatedSchema;

use super::set::ToolSpec;
use super::tool::AgentTool;

pub const STATE_SNAPSHOT_TOOL: &str = "AGUISendStateSnapshot";
pub const STATE_DELTA_TOOL: &str = "AGUISendStateDelta";

pub fn is_state_tool(name: &str) -> bool {
    name == STATE_SNAPSHOT_TOOL || name == STATE_DELTA_TOOL
}

pub fn state_snapshot_tool() -> AgentTool {
    AgentTool::new(
        STATE_SNAPSHOT_TOOL,
        "Replace the entire application state with a new snapshot",
        ValidatedSchema::object(vec![(
            "snapshot".into(),
            ValidatedSchema::any().describe("The complete new state object"),
        )]),
        |args, _ctx| async move {
            Ok(json!({
                "success": true,
                "snapshot": args.get("snapshot").cloned().unwrap_or_default(),
            }))
        },
    )
}

pub fn state_delta_tool() -> AgentTool {
    let operation = ValidatedSchema::object(vec![
        (
            "op".into(),
            ValidatedSchema::string_enum(&["add", "replace", "remove"])
                .describe("The operation to perform"),
        ),
        (
            "path".into(),
            ValidatedSchema::string().describe("JSON Pointer path (e.g., '/foo/bar')"),
        ),
        (
            "value".into(),
            ValidatedSchema::any()
                .optional()
                .describe("The value to set. Required for 'add' and 'replace' operations, ignored for 'remove'."),
        ),
    ]);

    AgentTool::new(
        STATE_DELTA_TOOL,
        "Apply incremental updates to application state using JSON Patch operations",
        ValidatedSchema::object(vec![(
            "delta".into(),
            ValidatedSchema::array(operation).describe("Array of JSON Patch operations"),
        )]),
        |args, _ctx| async move {
            Ok(json!({
                "success": true,
                "delta": args.get("delta").cloned().unwrap_or_else(|| json!([])),
            }))
        },
    )
}

/// Both state tools as locally executable specs, snapshot first.
pub fn state_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::local(Arc::new(state_snapshot_tool())),
        ToolSpec::local(Arc::new(state_delta_tool())),
    ]
}
