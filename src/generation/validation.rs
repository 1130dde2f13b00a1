//! Validation errors for generation requests.

use std::fmt;

/// Validation error naming the offending field, with an optional hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    pub message: String,
    /// Suggestion for how to fix the error
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Required field missing, or present but empty.
    pub fn missing_field(field: &str) -> Self {
        Self::new(field, format!("Missing required parameter '{}'", field))
    }

    /// Data source URL without an http(s) scheme.
    pub fn invalid_url(field: &str) -> Self {
        Self::new(field, format!("'{}' must start with http:// or https://", field))
            .with_suggestion("Provide the full address of the JSON API")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
