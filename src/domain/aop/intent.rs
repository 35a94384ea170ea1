//! Intent matching interface

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use super::{WorkflowCatalog, WorkflowDefinition};

#[cfg(test)]
use mockall::automock;

/// Picks the workflow a free-text message asks for
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IntentMatcher: Send + Sync + Debug {
    /// Name of the matching workflow, or `None` when nothing applies
    async fn match_intent(&self, message: &str, catalog: &WorkflowCatalog) -> Option<String>;
}

/// Prompt listing every workflow and asking for one exact name or `none`
pub fn intent_prompt(message: &str, catalog: &WorkflowCatalog) -> String {
    let descriptions = catalog
        .iter()
        .map(|w| format!("- {}: {}", w.name(), w.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "User message: \"{}\"\n\
         Available AOPs:\n{}\n\n\
         Which AOP best matches the user request?\n\
         Respond with the exact AOP name or 'none' if none apply.",
        message, descriptions
    )
}

/// Resolve a classifier answer against the catalog
///
/// Only a case-insensitive exact name match counts; `none` and free text resolve to `None`.
pub fn resolve_answer(answer: &str, catalog: &WorkflowCatalog) -> Option<Arc<WorkflowDefinition>> {
    let mut answer = answer.trim();

    // Quotes and a trailing full stop may wrap each other in either order
    loop {
        let stripped = answer
            .trim_end_matches('.')
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .trim();
        if stripped == answer {
            break;
        }
        answer = stripped;
    }

    if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
        return None;
    }

    catalog.get(answer)
}
