//! Turns a decoded upload form into a generation request.

use crate::generation::{
    DesignInput, GenerationError, GenerationRequest, JsonSource, OutputFormat, ValidationError,
};
use crate::multipart::{MultipartForm, MultipartParseError};

pub const DESIGN_FIELD: &str = "birtFile";
pub const JSON_URL_FIELD: &str = "jsonApiUrl";
pub const FORMAT_FIELD: &str = "format";

/// Design name used when the upload carries no filename.
const FALLBACK_DESIGN_NAME: &str = "file.rptdesign";
const DESIGN_EXTENSION: &str = ".rptdesign";

/// Checks fields in order: design, data source URL, format. The first failure
/// is reported.
pub fn generation_request(mut form: MultipartForm) -> Result<GenerationRequest, GenerationError> {
    let design = form
        .take_non_empty(DESIGN_FIELD)
        .ok_or_else(|| ValidationError::missing_field(DESIGN_FIELD))?;
    let file_name = match design.filename.filter(|name| !name.trim().is_empty()) {
        Some(name) if !is_design_name(&name) => {
            return Err(ValidationError::new(DESIGN_FIELD, "File must be a .rptdesign design")
                .with_suggestion("Upload the report design exported from the designer")
                .into());
        }
        Some(name) => name,
        None => FALLBACK_DESIGN_NAME.to_string(),
    };

    let url = text_field(&form, JSON_URL_FIELD)?
        .ok_or_else(|| ValidationError::missing_field(JSON_URL_FIELD))?;
    if !url.starts_with("http") {
        return Err(ValidationError::invalid_url(JSON_URL_FIELD).into());
    }

    let format = match text_field(&form, FORMAT_FIELD)? {
        Some(format) => format.parse()?,
        None => OutputFormat::default(),
    };

    Ok(GenerationRequest::new(
        DesignInput::Upload {
            bytes: design.data,
            file_name,
        },
        JsonSource::RemoteUrl(url.to_string()),
        format,
    ))
}

fn is_design_name(name: &str) -> bool {
    name.trim()
        .to_ascii_lowercase()
        .ends_with(DESIGN_EXTENSION)
}

fn text_field<'a>(
    form: &'a MultipartForm,
    name: &str,
) -> Result<Option<&'a str>, GenerationError> {
    form.text_value(name).map_err(|e| match e {
        MultipartParseError::Utf8Error(field) => {
            ValidationError::new(field, format!("'{}' must be valid UTF-8 text", name)).into()
        }
        other => ValidationError::new(name, other.to_string()).into(),
    })
}
