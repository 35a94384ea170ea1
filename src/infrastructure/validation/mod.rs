//! Answer validators

mod llm_validator;

pub use llm_validator::{extract_json_object, LlmValidator};
