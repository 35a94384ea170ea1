//! AOP execution

mod engine;

pub use engine::{decide, AopEngine, AopEngineConfig, Decision};
