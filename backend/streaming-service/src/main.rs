/// Streaming Service - HTTP Server
///
/// Hosts the owner-facing stream API, the public live/discovery API and the
/// RTMP webhook endpoints called by the media server.
use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{anyhow, Context};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

use streaming_service::db::{DynStreamStore, PgStreamStore};
use streaming_service::middleware::JwtAuthMiddleware;
use streaming_service::services::{
    IngestGate, LifecycleService, StreamKeyService, ThumbnailStorage, ViewerService,
};
use streaming_service::{handlers, metrics, Config};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .init();

    let config = Config::from_env().map_err(|e| anyhow!("Invalid configuration: {e}"))?;

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    info!(%bind_address, env = %config.app.env, "streaming-service starting");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    let store: DynStreamStore = Arc::new(PgStreamStore::new(db_pool));
    let key_service = StreamKeyService::new(store.clone());
    let lifecycle = LifecycleService::new(store.clone());
    let gate = IngestGate::new(store.clone(), lifecycle.clone());
    let viewers = ViewerService::new(store.clone());
    let thumbnails = ThumbnailStorage::new(&config.s3).await;

    let jwt_secret = config.auth.jwt_secret.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(key_service.clone()))
            .app_data(web::Data::new(lifecycle.clone()))
            .app_data(web::Data::new(gate.clone()))
            .app_data(web::Data::new(viewers.clone()))
            .app_data(web::Data::new(thumbnails.clone()))
            .wrap(TracingLogger::default())
            .route(
                "/api/v1/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .service(
                web::scope("/api/v1/streams")
                    .wrap(JwtAuthMiddleware::new(&jwt_secret))
                    .route("/key", web::get().to(handlers::get_stream_key))
                    .route("/key/reset", web::post().to(handlers::reset_stream_key))
                    .route("/setup", web::post().to(handlers::setup_stream))
                    .route("/current", web::get().to(handlers::get_current_stream))
                    .route("/{stream_id}", web::patch().to(handlers::update_stream))
                    .route("/{stream_id}/end", web::post().to(handlers::end_stream))
                    .route(
                        "/{stream_id}/thumbnail",
                        web::post().to(handlers::upload_thumbnail),
                    ),
            )
            .service(
                web::scope("/api/v1/live")
                    .route("", web::get().to(handlers::list_live_streams))
                    .route("/{stream_id}", web::get().to(handlers::get_live_stream))
                    .route("/{stream_id}/join", web::post().to(handlers::join_stream))
                    .route("/{stream_id}/leave", web::post().to(handlers::leave_stream)),
            )
            .service(
                web::scope("/internal/ingest")
                    .route("/auth", web::post().to(handlers::rtmp_auth))
                    .route("/done", web::post().to(handlers::rtmp_done)),
            )
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind on {bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    Ok(())
}
