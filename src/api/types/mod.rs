//! Request and response bodies of the HTTP API

pub mod chat;
pub mod error;
pub mod json;

pub use chat::{
    ChatRequest, ChatResponse, MessagesQuery, MessagesResponse, StateResponse,
    WorkflowRunRequest, WorkflowSummary, WorkflowsResponse,
};
pub use error::{ApiError, ApiErrorResponse};
pub use json::Json;
