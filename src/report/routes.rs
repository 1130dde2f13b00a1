use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::web;

use crate::report::handlers;

/// Open CORS headers, added to every response that does not set its own.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/reports")
            .wrap(cors_headers())
            .service(
                web::resource("/health")
                    .route(web::get().to(handlers::health))
                    .default_service(web::to(handlers::method_not_allowed)),
            )
            .service(
                web::resource("/formats")
                    .route(web::get().to(handlers::formats))
                    .default_service(web::to(handlers::method_not_allowed)),
            )
            .service(
                web::resource("/generate")
                    .route(web::post().to(handlers::generate_report))
                    .route(web::method(Method::OPTIONS).to(handlers::generate_preflight))
                    .default_service(web::to(handlers::method_not_allowed)),
            )
            .service(
                web::resource("/cleanup")
                    .route(web::post().to(handlers::cleanup_reports))
                    .default_service(web::to(handlers::method_not_allowed)),
            ),
    );
}
