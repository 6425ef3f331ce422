// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/games")
                // GET mirrors the CMS controller action; POST for callers that want a verb with side effects
                .route("/populate", web::get().to(handlers::populate))
                .route("/populate", web::post().to(handlers::populate)),
        );
}
