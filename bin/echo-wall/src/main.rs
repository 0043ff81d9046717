//! # Echo-Wall Binary
//!
//! The entry point that assembles the comment backend from compile-time
//! selected plugins and serves the single event endpoint.

use actix_web::{web, App, HttpServer};
use ew_api::collaborators::{
    ExternalImageHost, HttpChallengeVerifier, JsonImportSource, KeywordSpamChecker, LogNotifier,
};
use ew_api::state::AppState;
use ew_api::{configure_routes, middleware};
use ew_core::traits::MediaStore;
use std::sync::Arc;

// Feature-gated imports: plugins are swappable at build time
#[cfg(feature = "db-sqlite")]
use ew_db_sqlite::SqliteStore;

#[cfg(feature = "storage-local")]
use ew_storage_local::LocalMediaStore;

#[cfg(feature = "auth-simple")]
use ew_auth_simple::SimpleIdentityProvider;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url =
        std::env::var("ECHO_WALL_DATABASE").unwrap_or_else(|_| "sqlite:echo_wall.db".to_string());
    let bind = std::env::var("ECHO_WALL_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    // 1. Initialize the storage implementation
    #[cfg(feature = "db-sqlite")]
    let store = Arc::new(
        SqliteStore::new(&database_url)
            .await
            .expect("Failed to init SQLite"),
    );

    // 2. Initialize the identity implementation
    #[cfg(feature = "auth-simple")]
    let identity = Arc::new(SimpleIdentityProvider::new());

    // 3. Image uploads go to an external host when one is configured,
    //    otherwise to the local filesystem store.
    #[cfg(feature = "storage-local")]
    let media: Arc<dyn MediaStore> = match std::env::var("ECHO_WALL_IMAGE_HOST") {
        Ok(endpoint) if !endpoint.is_empty() => Arc::new(ExternalImageHost::new(endpoint)),
        _ => Arc::new(LocalMediaStore::new(
            "./data/uploads".into(),
            "/static/uploads".to_string(),
        )),
    };

    // 4. Wrap everything in the shared application state
    let state = web::Data::new(AppState::new(
        store.clone(),
        store.clone(),
        store,
        identity,
        media,
        Arc::new(KeywordSpamChecker),
        Arc::new(LogNotifier),
        Arc::new(HttpChallengeVerifier::new()),
        vec![Arc::new(JsonImportSource)],
    ));

    log::info!("echo-wall listening on http://{bind}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::standard_middleware())
            .wrap(middleware::cors_policy())
            .configure(configure_routes)
    })
    .bind(&bind)?
    .run()
    .await
}
