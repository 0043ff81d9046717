//! # ew-api
//!
//! The event dispatch and orchestration layer for Echo-Wall. Every widget
//! request is a JSON POST carrying an `event` name and operation fields;
//! the single route resolves the client ip and origin, applies the CORS
//! allow-list, and hands off to the dispatcher.

pub mod collaborators;
pub mod comments;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod state;

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde_json::json;

use state::AppState;

/// Configures the routes for the comment backend.
///
/// A scoped configuration so the main binary can mount the API under
/// different paths if needed (e.g., /api/v1/).
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("").route("/", web::post().to(handle_event)));
}

async fn handle_event(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or_default()
        .to_string();
    let origin = req
        .headers()
        .get(actix_web::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(origin) = &origin {
        let allow_list = match data.config().await {
            Ok(config) => state::cfg_str(&config, "CORS_ALLOW_ORIGINS").to_string(),
            Err(_) => String::new(),
        };
        if !middleware::origin_allowed(&allow_list, origin) {
            return HttpResponse::Forbidden()
                .json(json!({ "code": 1000, "message": "origin is not allowed" }));
        }
    }

    let response = handlers::dispatch(data.into_inner(), body.into_inner(), client_ip).await;

    let mut builder = HttpResponse::Ok();
    if let Some(origin) = origin {
        builder.insert_header(("Access-Control-Allow-Origin", origin));
        builder.insert_header(("Access-Control-Allow-Credentials", "true"));
    }
    builder.json(response)
}
