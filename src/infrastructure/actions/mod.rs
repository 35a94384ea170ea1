//! Built-in workflow actions

mod builtin;

pub use builtin::{builtin_registry, BUILTIN_ACTIONS};
