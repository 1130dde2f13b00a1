use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

impl HealthResponse {
    pub fn up() -> Self {
        Self {
            status: "UP".to_string(),
            service: "Report Generation Service".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct FormatsResponse {
    pub formats: Vec<String>,
}

/// Multipart body of `POST /api/reports/generate`. Documentation only; the
/// body is decoded by the in-crate multipart decoder.
#[allow(non_snake_case)]
#[derive(Debug, ToSchema)]
pub struct GenerateReportForm {
    /// Report design (.rptdesign)
    #[schema(value_type = String, format = Binary)]
    pub birtFile: Vec<u8>,
    /// JSON API address, must start with http
    pub jsonApiUrl: String,
    /// PDF, XLSX, HTML or DOC. Defaults to PDF
    pub format: Option<String>,
}

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct CleanupRequest {
    /// Retention in days. Defaults to the configured value.
    pub days: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct CleanupResponse {
    pub message: String,
    pub deleted_files: usize,
    pub failed_files: usize,
    pub days: u64,
}
