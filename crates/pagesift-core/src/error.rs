use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Failed to parse XML: {0}")]
    XmlParse(String),

    #[error("Could not repair XML after {attempts} attempt(s) and {fixes} fix(es): {reason}")]
    XmlRepair {
        attempts: u32,
        fixes: usize,
        reason: String,
    },

    #[error("Archive already contains an entry for '{0}'")]
    Collision(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<zip::result::ZipError> for SiftError {
    fn from(e: zip::result::ZipError) -> Self {
        SiftError::Archive(e.to_string())
    }
}

impl From<csv::Error> for SiftError {
    fn from(e: csv::Error) -> Self {
        SiftError::SerializationError(e.to_string())
    }
}

/// A failure scoped to one keyword or value that did not abort the operation
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub message: String,
}

impl ItemFailure {
    pub fn new(item: &str, error: &SiftError) -> Self {
        Self {
            item: item.to_string(),
            message: error.to_string(),
        }
    }
}
