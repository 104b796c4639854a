use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Error when a file path is invalid or doesn't exist
    #[error("File path error: {0}")]
    FilePathError(String),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CliError {
    pub fn file_path_error(path: impl Into<String>) -> Self {
        Self::FilePathError(path.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
