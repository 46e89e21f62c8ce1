use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),
}

pub type Result<T> = std::result::Result<T, ReconError>;
