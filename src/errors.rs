use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ScanError {
    pub fn parse_error(msg: impl Into<String>) -> Self {
        ScanError::Parse(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        ScanError::Analysis(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ScanError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
