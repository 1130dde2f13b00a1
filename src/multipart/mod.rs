//! `multipart/form-data` decoding for report uploads.
//!
//! The decoder works on the fully buffered request body and the boundary taken
//! from the `Content-Type` header. Payloads are sliced out of the original
//! buffer by byte offset, so binary design files survive untouched.

mod parser;

use std::collections::HashMap;

use actix_web::HttpResponse;

use crate::ErrorResponse;

pub use parser::{boundary_from_content_type, MultipartDecoder};

#[derive(Debug, thiserror::Error)]
pub enum MultipartParseError {
    #[error("Multipart field error: {0}")]
    FieldError(String),
    #[error("Malformed multipart body: {0}")]
    MalformedBody(String),
    #[error("Invalid UTF-8 data in field '{0}'")]
    Utf8Error(String),
    #[error("Payload too large, maximum is {0} bytes")]
    PayloadTooLarge(usize),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<MultipartParseError> for HttpResponse {
    fn from(error: MultipartParseError) -> Self {
        match error {
            MultipartParseError::PayloadTooLarge(_) => HttpResponse::PayloadTooLarge()
                .json(ErrorResponse::new(&error.to_string())),
            MultipartParseError::IoError(_) => HttpResponse::InternalServerError()
                .json(ErrorResponse::new(&error.to_string())),
            _ => HttpResponse::BadRequest().json(ErrorResponse::new(&error.to_string())),
        }
    }
}

/// One decoded part. A part carrying a `filename` is a file field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartField {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl MultipartField {
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    pub fn text(&self) -> Result<&str, MultipartParseError> {
        std::str::from_utf8(&self.data)
            .map_err(|_| MultipartParseError::Utf8Error(self.name.clone()))
    }
}

/// Decoded form keyed by field name. A repeated name keeps the last part.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, MultipartField>,
}

impl MultipartForm {
    pub(crate) fn insert(&mut self, field: MultipartField) {
        self.fields.insert(field.name.clone(), field);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, name: &str) -> Option<&MultipartField> {
        self.fields.get(name)
    }

    /// Removes a field and returns it only if it carries a non-empty payload.
    pub fn take_non_empty(&mut self, name: &str) -> Option<MultipartField> {
        self.fields.remove(name).filter(|field| !field.data.is_empty())
    }

    /// Trimmed text value of a field. Missing and blank fields are both `None`.
    pub fn text_value(&self, name: &str) -> Result<Option<&str>, MultipartParseError> {
        match self.fields.get(name) {
            Some(field) => {
                let value = field.text()?.trim();
                Ok((!value.is_empty()).then_some(value))
            }
            None => Ok(None),
        }
    }
}
