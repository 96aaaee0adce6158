use thiserror::Error;

/// Errors that can occur in the correlation pipeline
#[derive(Error, Debug)]
pub enum CrosscapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decoder error: {0}")]
    Decode(String),

    #[error("Match file error: {0}")]
    MatchFile(String),

    #[error("Service list error: {0}")]
    ServiceList(String),

    #[error("Service group mapping error: {0}")]
    ServiceGroups(String),
}

pub type Result<T> = std::result::Result<T, CrosscapError>;
