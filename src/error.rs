use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PathwayError {
    #[error("network request to {url} failed after {attempts} attempts: {message}")]
    #[diagnostic(help("the remote host may be down or rate limiting; try again later"))]
    Network {
        url: String,
        attempts: usize,
        message: String,
    },

    #[error("request to {url} returned status {status}: {message}")]
    Request {
        url: String,
        status: u16,
        message: String,
    },

    #[error("dataset not present in shared cache: {0}")]
    #[diagnostic(help("run `pathwaydb data fetch {0}` or enable auto-download"))]
    CacheMiss(String),

    #[error("annotation store at {path} is unreadable: {message}")]
    #[diagnostic(help("delete the file or reopen it with recreate_if_corrupt to rebuild it"))]
    StoreCorruption { path: PathBuf, message: String },

    #[error("invalid filter criteria: {0}")]
    Validation(String),

    #[error("invalid dataset key: {0}")]
    #[diagnostic(help("expected kegg:<organism>, go:<species> or msigdb:[<species>:]<collection>"))]
    InvalidDatasetKey(String),

    #[error("dataset not found locally: {0}")]
    DatasetNotFound(String),

    #[error("missing config file pathwaydb.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to set up HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to parse {source_name} payload: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl PathwayError {
    pub fn parse(source_name: &str, message: impl Into<String>) -> Self {
        PathwayError::Parse {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error came from a remote host rather than local state.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            PathwayError::Network { .. } | PathwayError::Request { .. }
        )
    }
}
