// HTTP request handlers

use std::time::Instant;

use actix_web::{web, HttpResponse, Result};
use indexmap::IndexMap;

use crate::api::models::*;
use crate::populate::PopulateService;

pub const FINISHED_TEXT: &str = "Finished populating!";

/// Shared state behind every handler
pub struct ApiState {
    pub service: PopulateService,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(service: PopulateService) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

/// Health check endpoint
pub async fn health_check(state: web::Data<ApiState>) -> Result<HttpResponse> {
    let cfg = state.service.config();
    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        cms_url: cfg.cms_url.clone(),
        storefront_url: cfg.gog_base_url.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    });
    Ok(HttpResponse::Ok().json(response))
}

/// Run one populate batch. Query keys (sort, page, any storefront filter) are
/// passed through to the listing request.
///
/// Answers with plain text once the batch is over, however many games or
/// images failed; details are in the logs.
pub async fn populate(
    query: web::Query<IndexMap<String, String>>,
    state: web::Data<ApiState>,
) -> Result<HttpResponse> {
    let overrides = query.into_inner();
    tracing::info!(overrides = ?overrides, "populate requested");

    match state.service.populate(overrides).await {
        Ok(_) => Ok(HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(FINISHED_TEXT)),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "populate run aborted");
            Ok(HttpResponse::InternalServerError()
                .content_type("text/plain; charset=utf-8")
                .body("Populate failed; see server logs"))
        }
    }
}
