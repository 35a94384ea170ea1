//! Workflow catalog documents and lookup

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AopError, Condition, DecisionRule, StepDefinition, StepKind, WorkflowDefinition};

/// Catalog document for one workflow, as authored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AopDocument {
    pub aop_name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepDocument>,
}

/// Catalog document for one step, as authored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDocument {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub requires_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub success_next: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decision_logic: Vec<RuleDocument>,
}

/// Catalog document for one decision rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    pub condition: String,
    pub next: String,
}

/// TOML catalogs hold workflows under repeated `[[aop]]` tables
#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    aop: Vec<AopDocument>,
}

fn parse_kind(step: &str, kind: Option<&str>) -> Result<StepKind, AopError> {
    match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("action") => Ok(StepKind::Action),
        Some("decision") => Ok(StepKind::Decision),
        Some("terminal") | Some("end") => Ok(StepKind::Terminal),
        Some(other) => Err(AopError::UnknownStepType {
            step: step.to_string(),
            kind: other.to_string(),
        }),
    }
}

impl TryFrom<StepDocument> for StepDefinition {
    type Error = AopError;

    fn try_from(doc: StepDocument) -> Result<Self, Self::Error> {
        let kind = parse_kind(&doc.id, doc.kind.as_deref())?;
        let mut step = StepDefinition::new(&doc.id, kind).with_response_required(doc.requires_response);

        if let Some(prompt) = doc.user_prompt {
            step = step.with_prompt(prompt);
        }

        if let Some(expected) = doc.expected_input {
            step = step.with_expected_input(expected);
        }

        if let Some(action) = doc.action.filter(|a| !a.trim().is_empty()) {
            step = step.with_action(action);
        }

        if let Some(next) = doc.success_next.filter(|n| !n.trim().is_empty()) {
            step = step.with_next(next);
        }

        for rule in doc.decision_logic {
            let condition =
                Condition::parse(&rule.condition).map_err(|source| AopError::InvalidCondition {
                    step: doc.id.clone(),
                    condition: rule.condition.clone(),
                    source,
                })?;
            step = step.with_rule(DecisionRule::new(condition, rule.next));
        }

        Ok(step)
    }
}

impl TryFrom<AopDocument> for WorkflowDefinition {
    type Error = AopError;

    fn try_from(doc: AopDocument) -> Result<Self, Self::Error> {
        let steps = doc
            .steps
            .into_iter()
            .map(StepDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        WorkflowDefinition::new(doc.aop_name, doc.description, steps)
    }
}

/// The set of workflows known to the agent, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    workflows: Vec<Arc<WorkflowDefinition>>,
}

impl WorkflowCatalog {
    /// Build a catalog, rejecting names that collide case-insensitively
    pub fn new(workflows: Vec<WorkflowDefinition>) -> Result<Self, AopError> {
        let mut catalog = Self::default();

        for workflow in workflows {
            if catalog.get(workflow.name()).is_some() {
                return Err(AopError::DuplicateWorkflow(workflow.name().to_string()));
            }
            catalog.workflows.push(Arc::new(workflow));
        }

        Ok(catalog)
    }

    pub fn from_documents(documents: Vec<AopDocument>) -> Result<Self, AopError> {
        let workflows = documents
            .into_iter()
            .map(WorkflowDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(workflows)
    }

    /// Parse a JSON array of workflow documents
    pub fn from_json_str(content: &str) -> Result<Self, AopError> {
        let documents: Vec<AopDocument> = serde_json::from_str(content)
            .map_err(|e| AopError::catalog(format!("Invalid JSON catalog: {}", e)))?;

        Self::from_documents(documents)
    }

    /// Parse a TOML document of `[[aop]]` tables
    pub fn from_toml_str(content: &str) -> Result<Self, AopError> {
        let parsed: TomlCatalog = toml::from_str(content)
            .map_err(|e| AopError::catalog(format!("Invalid TOML catalog: {}", e)))?;

        Self::from_documents(parsed.aop)
    }

    /// Case-insensitive exact lookup by workflow name
    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        let name = name.trim();

        self.workflows
            .iter()
            .find(|w| w.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkflowDefinition>> {
        self.workflows.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.workflows.iter().map(|w| w.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
