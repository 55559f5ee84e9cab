use thiserror::Error;

use crate::application::extractor::ExtractError;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unpack error: {0}")]
    Unpack(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("No {0} folder selected")]
    FolderNotConfigured(&'static str),

    #[error("A download sequence is already running")]
    Busy,

    #[error("No mods selected for download")]
    NothingSelected,

    #[error("No mod at position {0}")]
    NoSuchItem(usize),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Failed to import: {0}")]
    Import(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
