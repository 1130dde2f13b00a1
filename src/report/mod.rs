//! HTTP transport for report generation under `/api/reports`.

pub mod form;
pub mod handlers;
pub mod models;
pub mod routes;
