//! Workflow catalog loading

mod loader;

pub use loader::{default_catalog, load_catalog, CatalogFormat, DEFAULT_CATALOG_JSON};
