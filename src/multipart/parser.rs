use log::debug;

use super::{MultipartField, MultipartForm, MultipartParseError};

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Extracts the boundary token from a `multipart/form-data` content type.
///
/// Returns `None` for any other media type or when the parameter is missing.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
}

#[derive(Debug, Default)]
struct PartHeaders {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
}

enum State {
    Preamble,
    Delimiter,
    Headers,
    Payload(PartHeaders),
    Done,
}

pub struct MultipartDecoder<'a> {
    body: &'a [u8],
    /// `--<boundary>`
    delimiter: Vec<u8>,
    /// `\r\n--<boundary>`, the only form that may end a payload.
    payload_end: Vec<u8>,
}

impl<'a> MultipartDecoder<'a> {
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary.as_bytes());

        let mut payload_end = Vec::with_capacity(delimiter.len() + 2);
        payload_end.extend_from_slice(CRLF);
        payload_end.extend_from_slice(&delimiter);

        Self {
            body,
            delimiter,
            payload_end,
        }
    }

    /// Decodes a request body given its `Content-Type` header.
    ///
    /// A missing or non-multipart content type yields an empty form; callers
    /// treat that as a validation failure.
    pub fn decode(
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<MultipartForm, MultipartParseError> {
        match content_type.and_then(boundary_from_content_type) {
            Some(boundary) => MultipartDecoder::new(body, &boundary).parse(),
            None => {
                debug!("Request is not multipart/form-data, returning empty form");
                Ok(MultipartForm::default())
            }
        }
    }

    pub fn parse(&self) -> Result<MultipartForm, MultipartParseError> {
        let mut form = MultipartForm::default();
        let mut pos = 0;
        let mut state = State::Preamble;

        loop {
            state = match state {
                State::Preamble => {
                    let start = find(self.body, &self.delimiter, 0).ok_or_else(|| {
                        MultipartParseError::MalformedBody("opening boundary not found".to_string())
                    })?;
                    pos = start + self.delimiter.len();
                    State::Delimiter
                }
                State::Delimiter => {
                    if self.body[pos..].starts_with(b"--") {
                        State::Done
                    } else {
                        // Anything up to the line break is transport padding.
                        let eol = find(self.body, CRLF, pos).ok_or_else(|| {
                            MultipartParseError::MalformedBody(
                                "boundary line is not terminated".to_string(),
                            )
                        })?;
                        pos = eol + CRLF.len();
                        State::Headers
                    }
                }
                State::Headers => {
                    let (headers, payload_start) = if self.body[pos..].starts_with(CRLF) {
                        (PartHeaders::default(), pos + CRLF.len())
                    } else {
                        let end = find(self.body, HEADER_END, pos).ok_or_else(|| {
                            MultipartParseError::MalformedBody(
                                "part headers are not terminated".to_string(),
                            )
                        })?;
                        (parse_headers(&self.body[pos..end]), end + HEADER_END.len())
                    };
                    pos = payload_start;
                    State::Payload(headers)
                }
                State::Payload(headers) => {
                    let end = find(self.body, &self.payload_end, pos).ok_or_else(|| {
                        MultipartParseError::MalformedBody("closing boundary not found".to_string())
                    })?;
                    let name = headers.name.ok_or_else(|| {
                        MultipartParseError::FieldError(
                            "Content-Disposition with a field name not found".to_string(),
                        )
                    })?;

                    debug!("Decoded multipart field '{}' ({} bytes)", name, end - pos);
                    form.insert(MultipartField {
                        name,
                        filename: headers.filename,
                        content_type: headers.content_type,
                        data: self.body[pos..end].to_vec(),
                    });

                    pos = end + self.payload_end.len();
                    State::Delimiter
                }
                State::Done => return Ok(form),
            };
        }
    }
}

fn parse_headers(block: &[u8]) -> PartHeaders {
    let text = String::from_utf8_lossy(block);
    let mut headers = PartHeaders::default();

    for line in text.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            for (param, param_value) in disposition_params(value) {
                match param.as_str() {
                    "name" => headers.name = Some(param_value),
                    "filename" => headers.filename = Some(param_value),
                    _ => {}
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") {
            headers.content_type = Some(value.trim().to_string());
        }
    }

    headers
}

/// Splits `form-data; name="a"; filename="b;c"` into lowercase keys and
/// unquoted values, honouring semicolons inside quotes.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in value.chars() {
        match ch {
            _ if escaped => {
                current.push(ch);
                escaped = false;
            }
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            Some((key.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| offset + from)
}
