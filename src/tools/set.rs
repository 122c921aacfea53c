//! Ordered, name-keyed tool catalog for a run.

use std::fmt;
use std::sync::Arc;

use crate::provider::ToolDefinition;
use crate::schema::ValidatedSchema;

use super::tool::Tool;

/// A tool offered to the model.
///
/// Specs with an executor run in-process; specs without one are remote and
/// end the run so the host can execute them and report back.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: ValidatedSchema,
    pub executor: Option<Arc<dyn Tool>>,
}

impl ToolSpec {
    pub fn remote(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ValidatedSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            executor: None,
        }
    }

    pub fn local(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters().clone(),
            executor: Some(tool),
        }
    }

    pub fn is_local(&self) -> bool {
        self.executor.is_some()
    }

    /// Provider-facing declaration.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.to_json_schema(),
        }
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("local", &self.is_local())
            .finish()
    }
}

/// Insertion-ordered tool map. Inserting a name that already exists replaces
/// the earlier spec in place.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    specs: Vec<ToolSpec>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: ToolSpec) {
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    /// Merge another set; its entries win on name collisions.
    pub fn merge(&mut self, other: ToolSet) {
        for spec in other.specs {
            self.insert(spec);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.specs.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs.iter().map(ToolSpec::definition).collect()
    }
}

impl FromIterator<ToolSpec> for ToolSet {
    fn from_iter<I: IntoIterator<Item = ToolSpec>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for spec in iter {
            set.insert(spec);
        }
        set
    }
}
