use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;

mod api;
mod attendance;
mod auth;
mod clock;
mod config;
mod db;
mod docs;
mod geo;
mod model;
mod models;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use crate::clock::SystemClock;
use crate::docs::ApiDoc;
use crate::state::AppState;
use crate::store::mysql::MySqlStore;
use config::Config;
use db::init_db;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Geofenced attendance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    let store = Arc::new(MySqlStore::new(pool));

    auth::handlers::ensure_admin(store.as_ref(), &config).await?;

    let server_addr = config.server_addr.clone();
    let state = AppState::new(config, store, Arc::new(SystemClock))?;

    info!(
        addr = %server_addr,
        office_open = state.office_hours.is_open(),
        "Listening"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .configure(|cfg| state.register(cfg))
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &state.config))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
