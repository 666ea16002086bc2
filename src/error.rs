use chrono::NaiveDate;
use thiserror::Error;

use crate::models::ImportErrorKind;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("No import record at index {0}")]
    RecordNotFound(usize),

    #[error("Import record {0} was already committed or skipped")]
    RecordClosed(usize),

    #[error("Team not found in roster: {0}")]
    TeamIdMissing(String),

    #[error("Cannot build a timestamp from {date} {time}")]
    InvalidTimestamp { date: NaiveDate, time: String },

    #[error("Invalid goal values")]
    InvalidGoals,

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl ImportError {
    /// Kind recorded on the import row when this error hits it.
    pub fn kind(&self) -> ImportErrorKind {
        match self {
            Self::TeamIdMissing(_) => ImportErrorKind::TeamNotFound,
            Self::InvalidTimestamp { .. } => ImportErrorKind::InvalidTime,
            Self::InvalidGoals => ImportErrorKind::InvalidGoals,
            _ => ImportErrorKind::DatabaseError,
        }
    }
}
