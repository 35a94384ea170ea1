//! Workflow definition model

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use super::{AopError, Condition};

/// Kind of a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Runs an optional registered action, then moves to `success_next`
    #[default]
    Action,
    /// Routes to the first rule whose condition holds
    Decision,
    /// Ends the workflow
    Terminal,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "action"),
            Self::Decision => write!(f, "decision"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// One routing rule of a decision step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRule {
    pub condition: Condition,
    #[serde(rename = "next")]
    pub next_step_id: String,
}

impl DecisionRule {
    pub fn new(condition: Condition, next_step_id: impl Into<String>) -> Self {
        Self {
            condition,
            next_step_id: next_step_id.into(),
        }
    }
}

/// A single step of a workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDefinition {
    id: String,
    kind: StepKind,
    requires_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    decision_rules: Vec<DecisionRule>,
    success_next: Option<String>,
}

impl StepDefinition {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            requires_response: false,
            expected_input: None,
            user_prompt: None,
            action_name: None,
            decision_rules: Vec::new(),
            success_next: None,
        }
    }

    pub fn action(id: impl Into<String>) -> Self {
        Self::new(id, StepKind::Action)
    }

    pub fn decision(id: impl Into<String>) -> Self {
        Self::new(id, StepKind::Decision)
    }

    pub fn terminal(id: impl Into<String>) -> Self {
        Self::new(id, StepKind::Terminal)
    }

    /// Make this step an input checkpoint
    pub fn requiring_response(
        mut self,
        user_prompt: impl Into<String>,
        expected_input: impl Into<String>,
    ) -> Self {
        self.requires_response = true;
        self.user_prompt = Some(user_prompt.into());
        self.expected_input = Some(expected_input.into());
        self
    }

    pub fn with_response_required(mut self, required: bool) -> Self {
        self.requires_response = required;
        self
    }

    pub fn with_prompt(mut self, user_prompt: impl Into<String>) -> Self {
        self.user_prompt = Some(user_prompt.into());
        self
    }

    pub fn with_expected_input(mut self, expected_input: impl Into<String>) -> Self {
        self.expected_input = Some(expected_input.into());
        self
    }

    pub fn with_action(mut self, action_name: impl Into<String>) -> Self {
        self.action_name = Some(action_name.into());
        self
    }

    pub fn with_rule(mut self, rule: DecisionRule) -> Self {
        self.decision_rules.push(rule);
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.success_next = Some(next.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn requires_response(&self) -> bool {
        self.requires_response
    }

    pub fn expected_input(&self) -> Option<&str> {
        self.expected_input.as_deref()
    }

    pub fn user_prompt(&self) -> Option<&str> {
        self.user_prompt.as_deref()
    }

    pub fn action_name(&self) -> Option<&str> {
        self.action_name.as_deref()
    }

    pub fn decision_rules(&self) -> &[DecisionRule] {
        &self.decision_rules
    }

    pub fn success_next(&self) -> Option<&str> {
        self.success_next.as_deref()
    }

    /// Every step id this step can transfer control to
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.success_next
            .as_deref()
            .into_iter()
            .chain(self.decision_rules.iter().map(|r| r.next_step_id.as_str()))
    }
}

/// An immutable, validated workflow procedure
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDefinition {
    name: String,
    description: String,
    steps: Vec<StepDefinition>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl WorkflowDefinition {
    /// Build a definition, checking step ids and every step reference
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<StepDefinition>,
    ) -> Result<Self, AopError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(AopError::EmptyName);
        }

        if steps.is_empty() {
            return Err(AopError::empty_workflow(&name));
        }

        let mut index = HashMap::with_capacity(steps.len());

        for (position, step) in steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(AopError::EmptyStepId(name));
            }

            if index.insert(step.id.clone(), position).is_some() {
                return Err(AopError::duplicate_step(&name, &step.id));
            }
        }

        let known: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();

        for step in &steps {
            if let Some(target) = step.targets().find(|t| !known.contains(t)) {
                return Err(AopError::unknown_step_reference(&name, &step.id, target));
            }
        }

        Ok(Self {
            name,
            description: description.into(),
            steps,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// The entry step; definitions always hold at least one step
    pub fn first_step(&self) -> &StepDefinition {
        &self.steps[0]
    }

    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.index.get(id).map(|&i| &self.steps[i])
    }
}

impl PartialEq for WorkflowDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.description == other.description && self.steps == other.steps
    }
}
