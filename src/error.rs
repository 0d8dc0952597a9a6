use thiserror::Error;

use crate::models::Id;

#[derive(Error, Debug)]
pub enum RentbookError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Id },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("{0}")]
    Other(String),
}

impl RentbookError {
    pub fn not_found(entity: &'static str, id: Id) -> Self {
        Self::NotFound { entity, id }
    }

    /// HTTP-equivalent status for callers that front the core with a web layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Extraction(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, RentbookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RentbookError::Validation("bad".into()).status_code(), 400);
        assert_eq!(RentbookError::not_found("tenant", 4).status_code(), 404);
        assert_eq!(RentbookError::Conflict("closed".into()).status_code(), 409);
        assert_eq!(RentbookError::Other("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_not_found_message() {
        let err = RentbookError::not_found("payment", 12);
        assert_eq!(err.to_string(), "payment not found: 12");
    }
}
