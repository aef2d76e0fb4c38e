use thiserror::Error;

/// Errors raised by the ambient layer (config, snapshot output, startup).
///
/// The discovery / enrichment core never returns these: node failures are
/// encoded as `None` or an empty list.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type AppResult<T> = Result<T, AppError>;
