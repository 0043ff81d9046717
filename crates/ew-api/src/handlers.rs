//! # Handlers
//!
//! The event dispatcher and the non-comment operations: counters, config,
//! the password lifecycle, and image upload. Each request resolves its
//! identity once, routes on the event name, and unexpected failures are
//! caught here exactly once.

use std::sync::Arc;

use base64::Engine;
use ew_core::error::{AppError, Result};
use ew_core::models::ConfigMap;
use ew_core::now_ms;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::comments;
use crate::state::{cfg_str, public_view, require_admin, AppState};

/// Per-request identity, resolved once by the dispatcher.
pub struct RequestContext {
    /// The caller's access token, issued fresh when none was supplied.
    pub token: String,
    pub ip: String,
    pub admin: bool,
}

/// Route one request envelope to its handler and shape the response
/// envelope. Never panics outward; every error becomes a wire code or a
/// bare message.
pub async fn dispatch(state: Arc<AppState>, body: Value, ip: String) -> Value {
    // Coarse per-process ceiling before anything touches storage.
    if let Err(err) = state.tally.bump(&ip) {
        return error_envelope(&err);
    }

    let event = body
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let supplied = body
        .get("accessToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let token = supplied
        .clone()
        .unwrap_or_else(|| state.identity.issue_token());

    let mut response = match route(&state, &event, token.clone(), &ip, body).await {
        Ok(value) => value,
        Err(err) => {
            if let AppError::Internal(message) = &err {
                log::error!("event {event} from {ip} failed: {message}");
            }
            error_envelope(&err)
        }
    };

    // Identity continuity: a caller that supplied no token gets the newly
    // issued one back.
    if supplied.is_none() {
        if let Value::Object(map) = &mut response {
            map.entry("accessToken").or_insert_with(|| json!(token));
        }
    }
    response
}

fn error_envelope(err: &AppError) -> Value {
    match err.code() {
        Some(code) => json!({ "code": code, "message": err.to_string() }),
        None => json!({ "message": err.to_string() }),
    }
}

async fn route(
    state: &Arc<AppState>,
    event: &str,
    token: String,
    ip: &str,
    body: Value,
) -> Result<Value> {
    let admin = state.is_admin(&token).await?;
    let ctx = RequestContext {
        token,
        ip: ip.to_string(),
        admin,
    };
    match event {
        "COMMENT_GET" => comments::page(state, &ctx, parse(body)?).await,
        "COMMENT_GET_FOR_ADMIN" => comments::admin_page(state, &ctx, parse(body)?).await,
        "COMMENT_SET_FOR_ADMIN" => comments::admin_set(state, &ctx, parse(body)?).await,
        "COMMENT_DELETE_FOR_ADMIN" => comments::admin_delete(state, &ctx, parse(body)?).await,
        "COMMENT_IMPORT_FOR_ADMIN" => comments::admin_import(state, &ctx, parse(body)?).await,
        "COMMENT_EXPORT_FOR_ADMIN" => comments::admin_export(state, &ctx).await,
        "COMMENT_LIKE" => comments::like(state, &ctx, parse(body)?).await,
        "COMMENT_SUBMIT" => comments::submit(state, &ctx, parse(body)?).await,
        "GET_COMMENTS_COUNT" => comments::counts(state, parse(body)?).await,
        "GET_RECENT_COMMENTS" => comments::recent(state, &ctx, parse(body)?).await,
        "COUNTER_GET" => counter_get(state, parse(body)?).await,
        "GET_CONFIG" => get_config(state).await,
        "GET_CONFIG_FOR_ADMIN" => get_config_for_admin(state, &ctx).await,
        "SET_CONFIG" => set_config(state, &ctx, parse(body)?).await,
        "LOGIN" => login(state, parse(body)?).await,
        "SET_PASSWORD" => set_password(state, &ctx, parse(body)?).await,
        "GET_PASSWORD_STATUS" => password_status(state).await,
        "UPLOAD_IMAGE" => upload_image(state, parse(body)?).await,
        _ => Err(AppError::UnsupportedEvent),
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|err| AppError::Validation(err.to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CounterInput {
    url: String,
    title: String,
}

/// Reading a page's hit count increments it: one atomic upsert.
async fn counter_get(state: &Arc<AppState>, input: CounterInput) -> Result<Value> {
    if input.url.trim().is_empty() {
        return Err(AppError::Validation("url is required".to_string()));
    }
    let hits = state
        .counters
        .increment(&input.url, &input.title, now_ms())
        .await?;
    Ok(json!({ "data": hits }))
}

async fn get_config(state: &Arc<AppState>) -> Result<Value> {
    let config = state.config().await?;
    Ok(json!({ "code": 0, "config": public_view(&config) }))
}

async fn get_config_for_admin(state: &Arc<AppState>, ctx: &RequestContext) -> Result<Value> {
    require_admin(ctx.admin)?;
    let config = state.config().await?;
    Ok(json!({ "code": 0, "config": config }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SetConfigInput {
    config: ConfigMap,
}

async fn set_config(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: SetConfigInput,
) -> Result<Value> {
    require_admin(ctx.admin)?;
    state.set_config(&input.config).await?;
    Ok(json!({ "code": 0 }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PasswordInput {
    password: String,
}

async fn login(state: &Arc<AppState>, input: PasswordInput) -> Result<Value> {
    let config = state.config().await?;
    let stored = cfg_str(&config, "ADMIN_PASS");
    if stored.is_empty() {
        return Err(AppError::PasswordUnset);
    }
    let token = state.identity.password_token(&input.password);
    if state.identity.token_hash(&token) != stored {
        return Err(AppError::PasswordMismatch);
    }
    Ok(json!({ "code": 0, "accessToken": token }))
}

/// The first password set is open (deployment bootstrap); replacing an
/// existing password requires an admin session.
async fn set_password(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: PasswordInput,
) -> Result<Value> {
    if input.password.is_empty() {
        return Err(AppError::Validation("password is required".to_string()));
    }
    let config = state.config().await?;
    if !cfg_str(&config, "ADMIN_PASS").is_empty() && !ctx.admin {
        return Err(AppError::PasswordExists);
    }
    let token = state.identity.password_token(&input.password);
    let mut patch = ConfigMap::new();
    patch.insert(
        "ADMIN_PASS".to_string(),
        json!(state.identity.token_hash(&token)),
    );
    state.set_config(&patch).await?;
    Ok(json!({ "code": 0, "accessToken": token }))
}

async fn password_status(state: &Arc<AppState>) -> Result<Value> {
    let config = state.config().await?;
    Ok(json!({ "code": 0, "status": !cfg_str(&config, "ADMIN_PASS").is_empty() }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UploadInput {
    photo: String,
}

/// Image upload: accepts a data URL or raw base64, delegates storage to
/// the media port selected at assembly time.
async fn upload_image(state: &Arc<AppState>, input: UploadInput) -> Result<Value> {
    if input.photo.is_empty() {
        return Err(AppError::Validation("photo is required".to_string()));
    }
    let (content_type, encoded) = match input.photo.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| AppError::Validation("malformed data url".to_string()))?;
            (meta.split(';').next().unwrap_or("image/jpeg").to_string(), data)
        }
        None => ("image/jpeg".to_string(), input.photo.as_str()),
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| AppError::Validation(format!("invalid base64 payload: {err}")))?;
    let url = state.media.save_upload(bytes, &content_type).await?;
    Ok(json!({ "code": 0, "data": { "url": url } }))
}
