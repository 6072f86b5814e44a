use pubrecon_core::{CoreError, SourceKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{kind} has no profile for '{identifier}'")]
    ProfileNotFound { kind: SourceKind, identifier: String },

    #[error("timed out after {0}s: {1}")]
    Timeout(u64, String),

    #[error("render error: {0}")]
    Render(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("section '{0}' not found on page")]
    SectionMissing(String),

    #[error("no names given and no institution configured for the roster")]
    NoRoster,

    #[error("source not configured: {0}")]
    SourceUnavailable(SourceKind),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EngineError {
    /// Whether the source explicitly said the identifier does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProfileNotFound { .. } | Self::HttpStatus { status: 404, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
