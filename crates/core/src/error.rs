use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// A template could not be loaded or is structurally unusable.
///
/// Always fatal to the dispatch call that needed the template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid template: {0}")]
    Invalid(String),
}
