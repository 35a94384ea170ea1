use std::path::Path;

use tracing::{info, warn};

use crate::domain::aop::{AopError, WorkflowCatalog};

/// Catalog shipped with the binary, used when no catalog file is configured or found
pub const DEFAULT_CATALOG_JSON: &str = include_str!("default_aops.json");

/// Catalog file format, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Toml,
}

impl CatalogFormat {
    /// `.toml` selects TOML; anything else is read as JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }

    pub fn parse(self, content: &str) -> Result<WorkflowCatalog, AopError> {
        match self {
            Self::Json => WorkflowCatalog::from_json_str(content),
            Self::Toml => WorkflowCatalog::from_toml_str(content),
        }
    }
}

/// The built-in Refund and Flight Change workflows
pub fn default_catalog() -> Result<WorkflowCatalog, AopError> {
    WorkflowCatalog::from_json_str(DEFAULT_CATALOG_JSON)
}

/// Load the catalog at `path`, falling back to [`default_catalog`] when the file is missing
///
/// An empty path selects the built-in catalog. A file that exists but fails to parse
/// or validate is an error.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<WorkflowCatalog, AopError> {
    let path = path.as_ref();

    if path.as_os_str().is_empty() {
        info!("Using built-in workflow catalog");
        return default_catalog();
    }

    if !path.exists() {
        warn!(path = %path.display(), "Catalog file not found, using built-in workflows");
        return default_catalog();
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        AopError::catalog(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let catalog = CatalogFormat::from_path(path).parse(&content)?;

    info!(
        path = %path.display(),
        workflows = catalog.len(),
        "Workflow catalog loaded"
    );

    Ok(catalog)
}
