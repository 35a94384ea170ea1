//! Infrastructure layer - External service implementations

pub mod actions;
pub mod aop;
pub mod catalog;
pub mod conversation;
pub mod intent;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod services;
pub mod validation;
