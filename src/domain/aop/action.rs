//! Action registry
//!
//! Actions are named handlers that turn one [`WorkflowData`] into the next. Invocation is
//! best effort: unknown names and failing handlers leave the data untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::WorkflowData;

/// Error raised by an action handler
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A named side-effecting step of a workflow
#[async_trait]
pub trait ActionHandler: Send + Sync + fmt::Debug {
    /// Produce the next data from the current one
    async fn execute(&self, data: WorkflowData) -> Result<WorkflowData, ActionError>;
}

/// Adapter registering a plain function as an action
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&mut WorkflowData) -> Result<(), ActionError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: Fn(&mut WorkflowData) -> Result<(), ActionError> + Send + Sync,
{
    async fn execute(&self, mut data: WorkflowData) -> Result<WorkflowData, ActionError> {
        (self.f)(&mut data)?;
        Ok(data)
    }
}

/// What happened when an action was invoked
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Applied,
    NotRegistered,
    Failed(String),
}

/// Result of [`ActionRegistry::invoke`]
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInvocation {
    pub data: WorkflowData,
    pub outcome: ActionOutcome,
}

/// Mapping from action names to handlers
#[derive(Debug, Default, Clone)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Register a plain function
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut WorkflowData) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        let name = name.into();
        let handler = FnAction::new(name.clone(), f);
        self.register(name, Arc::new(handler));
    }

    pub fn with_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut WorkflowData) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        self.register_fn(name, f);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Apply the named action; never fails
    pub async fn invoke(&self, name: &str, data: WorkflowData) -> ActionInvocation {
        let Some(handler) = self.handlers.get(name) else {
            warn!(action = name, "Action not registered, skipping");
            return ActionInvocation {
                data,
                outcome: ActionOutcome::NotRegistered,
            };
        };

        match handler.execute(data.clone()).await {
            Ok(updated) => {
                debug!(action = name, "Action applied");
                ActionInvocation {
                    data: updated,
                    outcome: ActionOutcome::Applied,
                }
            }
            Err(e) => {
                warn!(action = name, error = %e, "Action failed, keeping data unchanged");
                ActionInvocation {
                    data,
                    outcome: ActionOutcome::Failed(e.message),
                }
            }
        }
    }
}
