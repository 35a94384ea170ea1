//! LLM-backed answer validator

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::aop::{InputValidator, ValidationVerdict, VerdictStatus};
use crate::domain::{DomainError, LlmProvider, LlmRequest, LlmResponseFormat};
use crate::infrastructure::observability::{
    record_llm_request, record_validation, LlmRequestMetricParams,
};

const VALIDATION_ERROR: &str = "validation error";

/// Raw verdict as returned by the model
#[derive(Debug, Deserialize)]
struct RawVerdict {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Validator asking a chat model for a `{"status", "reason"}` JSON verdict
#[derive(Debug)]
pub struct LlmValidator {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmValidator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn parse_verdict(content: &str) -> ValidationVerdict {
        let Some(json) = extract_json_object(content) else {
            warn!(reply = content, "Validator reply contains no JSON object");
            return ValidationVerdict::invalid(VALIDATION_ERROR);
        };

        let raw: RawVerdict = match serde_json::from_str(json) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Validator reply is not a verdict");
                return ValidationVerdict::invalid(VALIDATION_ERROR);
            }
        };

        let Some(status) = VerdictStatus::parse(&raw.status) else {
            warn!(status = %raw.status, "Validator returned an unknown status");
            return ValidationVerdict::invalid(VALIDATION_ERROR);
        };

        let reason = raw
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| default_reason(status).to_string());

        ValidationVerdict { status, reason }
    }
}

fn default_reason(status: VerdictStatus) -> &'static str {
    match status {
        VerdictStatus::Valid => "answer accepted",
        VerdictStatus::Invalid => "that doesn't look like the information I need",
        VerdictStatus::Cancel => "user asked to cancel",
    }
}

#[async_trait]
impl InputValidator for LlmValidator {
    async fn validate(&self, prompt: &str) -> Result<ValidationVerdict, DomainError> {
        let request = LlmRequest::builder()
            .user(prompt)
            .temperature(0.0)
            .response_format(LlmResponseFormat::JsonObject)
            .build();

        let start = Instant::now();
        let result = self.provider.chat(&self.model, request).await;

        record_llm_request(LlmRequestMetricParams {
            provider: self.provider.provider_name(),
            model: &self.model,
            purpose: "validation",
            duration: start.elapsed(),
            success: result.is_ok(),
        });

        let verdict = Self::parse_verdict(result?.content());
        record_validation(verdict.status.as_str());
        debug!(status = %verdict.status, reason = %verdict.reason, "Answer validated");

        Ok(verdict)
    }
}

/// First balanced `{...}` span in `text`, ignoring braces inside JSON strings
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}
