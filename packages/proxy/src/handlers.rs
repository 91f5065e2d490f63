//! HTTP handler functions for the mirror proxy.

use actix_web::{HttpRequest, HttpResponse, web};
use covid_map_proxy_models::ApiHealth;

use crate::{AppState, Route};

/// `GET /health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /{path}`
///
/// Serves a mirrored resource, refuses the log and metadata files, and
/// answers `404` for everything else.
pub async fn mirrored(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let path = req.path().trim_start_matches('/');

    match state.routes.get(path) {
        Some(Route::Forbidden) => HttpResponse::Forbidden().finish(),
        Some(Route::Resource(resource)) => match state.mirror.get(*resource).await {
            Ok(payload) => HttpResponse::Ok()
                .content_type("text/plain; charset=UTF-8")
                .body(payload),
            Err(e) => {
                log::error!("Failed to serve {resource}: {e}");
                HttpResponse::InternalServerError().finish()
            }
        },
        None => HttpResponse::NotFound().finish(),
    }
}
