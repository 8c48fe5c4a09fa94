use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Oracle,
    Io,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignError {
    pub code: ErrorCode,
    pub message: String,
}

impl DesignError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn oracle(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Oracle, message)
    }
}

impl fmt::Display for DesignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl Error for DesignError {}

impl From<std::io::Error> for DesignError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for DesignError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("Invalid JSON: {err}"))
    }
}

impl From<csv::Error> for DesignError {
    fn from(err: csv::Error) -> Self {
        Self::new(ErrorCode::Io, format!("CSV error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = DesignError::invalid_input("window length 120, expected 121");
        assert_eq!(
            err.to_string(),
            "InvalidInput: window length 120, expected 121"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DesignError = io.into();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
