//! Build pipeline errors.

/// Errors that can occur during a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Cannot resolve '{specifier}' imported from {importer}")]
    Resolve { specifier: String, importer: String },

    #[error("Failed to transform {path}: {message}")]
    Transform { path: String, message: String },

    #[error("Failed to render template: {0}")]
    Template(String),

    #[error("Stylesheet error in {path}: {message}")]
    Style { path: String, message: String },

    #[error("Image error for {path}: {message}")]
    Image { path: String, message: String },

    #[error("Failed to write output: {0}")]
    Write(String),
}

impl BuildError {
    pub(crate) fn read(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        BuildError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn write(err: impl std::fmt::Display) -> Self {
        BuildError::Write(err.to_string())
    }
}
