use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use futures::StreamExt;
use log::{debug, error, info, warn};

use crate::generation::{GenerationError, SUPPORTED_FORMATS};
use crate::multipart::{MultipartDecoder, MultipartParseError};
use crate::report::form;
use crate::report::models::{
    CleanupRequest, CleanupResponse, FormatsResponse, GenerateReportForm, HealthResponse,
};
use crate::{AppState, ErrorResponse};

#[utoipa::path(
    get,
    path = "/api/reports/health",
    tag = "Report Service",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse::up())
}

#[utoipa::path(
    get,
    path = "/api/reports/formats",
    tag = "Report Service",
    responses(
        (status = 200, description = "Supported output formats", body = FormatsResponse)
    )
)]
pub async fn formats() -> impl Responder {
    HttpResponse::Ok().json(FormatsResponse {
        formats: SUPPORTED_FORMATS
            .iter()
            .map(|format| format.as_str().to_string())
            .collect(),
    })
}

#[utoipa::path(
    post,
    path = "/api/reports/generate",
    tag = "Report Service",
    request_body(content = inline(GenerateReportForm), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Rendered report as an attachment"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 500, description = "Generation failed", body = ErrorResponse)
    )
)]
pub async fn generate_report(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> HttpResponse {
    info!("Executing generate_report handler");

    let body = match read_body(payload, data.max_upload_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Rejected report upload: {}", e);
            return e.into();
        }
    };

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let decoded = match MultipartDecoder::decode(content_type, &body) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Failed to decode multipart body: {}", e);
            return e.into();
        }
    };
    debug!("Decoded {} multipart field(s)", decoded.len());

    let request = match form::generation_request(decoded) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid report request: {}", e);
            return e.into();
        }
    };
    let format = request.format;

    let orchestrator = data.orchestrator.clone();
    let artifact = match web::block(move || orchestrator.generate(request)).await {
        Ok(Ok(artifact)) => artifact,
        Ok(Err(e)) => {
            error!("Report generation failed: {}", e);
            return e.into();
        }
        Err(e) => {
            error!("Report generation task failed: {}", e);
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::new("Report generation task failed"));
        }
    };

    let contents = match tokio::fs::read(artifact.path()).await {
        Ok(contents) => contents,
        Err(e) => {
            error!(
                "Failed to read generated report {}: {}",
                artifact.path().display(),
                e
            );
            return GenerationError::io("failed to read generated report", e).into();
        }
    };

    info!(
        "Sending report {} ({} bytes)",
        artifact.file_name(),
        contents.len()
    );
    HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name()),
        ))
        .body(contents)
}

/// CORS preflight for the generate route.
pub async fn generate_preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    post,
    path = "/api/reports/cleanup",
    tag = "Report Service",
    request_body = CleanupRequest,
    responses(
        (status = 200, description = "Expired reports deleted", body = CleanupResponse),
        (status = 400, description = "Invalid request body", body = ErrorResponse),
        (status = 500, description = "Cleanup failed", body = ErrorResponse)
    )
)]
pub async fn cleanup_reports(data: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    // An empty body means the configured retention; anything else must parse.
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CleanupRequest::default()
    } else {
        match serde_json::from_slice::<CleanupRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejected cleanup request: {}", e);
                return HttpResponse::BadRequest()
                    .json(ErrorResponse::new(&format!("Invalid cleanup request: {}", e)));
            }
        }
    };
    let days = request.days.unwrap_or(data.retention_days);
    info!("Executing cleanup_reports handler ({} day(s))", days);

    let retention = data.retention.clone();
    match web::block(move || retention.sweep(days)).await {
        Ok(report) => HttpResponse::Ok().json(CleanupResponse {
            message: "Cleanup completed".to_string(),
            deleted_files: report.deleted,
            failed_files: report.failed,
            days,
        }),
        Err(e) => {
            error!("Cleanup task failed: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse::new("Cleanup failed"))
        }
    }
}

pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ErrorResponse::new("Method not allowed"))
}

/// Buffers the request body, refusing to go past `limit` bytes.
async fn read_body(
    mut payload: web::Payload,
    limit: usize,
) -> Result<web::BytesMut, MultipartParseError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| MultipartParseError::IoError(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(MultipartParseError::PayloadTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
