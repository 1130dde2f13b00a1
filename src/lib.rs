use actix_web::middleware::Compress;
use actix_web::{web, App, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod generation;
pub mod multipart;
pub mod report;
pub mod retention;
pub mod state;

pub use crate::state::AppState;

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::report::handlers::health,
        crate::report::handlers::formats,
        crate::report::handlers::generate_report,
        crate::report::handlers::cleanup_reports
    ),
    components(
        schemas(
            report::models::HealthResponse,
            report::models::FormatsResponse,
            report::models::CleanupRequest,
            report::models::CleanupResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Report Service", description = "Report generation endpoints.")
    )
)]
pub struct ApiDoc;

pub async fn run() -> std::io::Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match config::ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.ensure_directories() {
        log::error!("Failed to prepare report directories: {}", e);
        std::process::exit(1);
    }
    log::info!(
        "Reports: uploads in {}, output in {}, engine home {}",
        config.upload_dir.display(),
        config.output_dir.display(),
        config.engine_home.display()
    );

    let app_state = web::Data::new(AppState::from_config(&config));
    retention::spawn_daily_sweep(app_state.retention.clone(), config.cleanup_days);

    let prometheus = PrometheusMetricsBuilder::new("report_generation_server")
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::other(format!("Prometheus setup failed: {}", e)))?;

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Compress::default())
            .wrap(prometheus.clone())
            .wrap(report::routes::cors_headers())
            .app_data(app_state.clone())
            .configure(report::routes::config)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
