use thiserror::Error;

/// All errors that can occur in pubrecon-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Person not found: {0}")]
    PersonNotFound(i64),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Migration error at version {version}: {message}")]
    Migration { version: u32, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes used by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    StorageError = 4,
    NetworkError = 6,
}

impl CoreError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::PersonNotFound(_) => ExitCode::NotFound,
            Self::UnknownSource(_) | Self::ValidationError(_) => ExitCode::InvalidArgs,
            Self::StorageUnavailable(_) | Self::Database(_) | Self::Migration { .. } => {
                ExitCode::StorageError
            }
            _ => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
