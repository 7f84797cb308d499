//! REST backend for a university project showcase.
//!
//! Students and institutions register accounts, institutions administer
//! them (including bulk CSV import), and every account can publish projects
//! it owns. Requests are authenticated with HMAC-signed bearer tokens that
//! are re-checked against the live account record on every call.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod err;
pub mod import;
pub mod io;
pub mod models;
pub mod projects;
pub mod routes;
pub mod store;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post, put};
use axum::{Extension, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::accounts::AccountService;
use crate::auth::TokenSigner;
use crate::config::{Config, StoreBackend};
use crate::err::{Error, Success};
use crate::io::MediaStore;
use crate::projects::ProjectService;
use crate::store::{
    AccountStore, MemoryAccountStore, MemoryProjectStore, PgAccountStore, PgProjectStore,
    ProjectStore,
};

pub const API_PREFIX: &str = "/api/v1";
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub type Payload<T> = axum::response::Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}

#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub projects: ProjectService,
    pub tokens: TokenSigner,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        accounts: Arc<dyn AccountStore>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        let media = MediaStore::new(config.static_dir.clone());
        let tokens = TokenSigner::new(
            &config.token_secret,
            chrono::Duration::minutes(config.token_ttl_minutes),
        );
        Self {
            accounts: AccountService::new(accounts.clone(), projects.clone(), media),
            projects: ProjectService::new(projects, accounts),
            tokens,
            config: Arc::new(config),
        }
    }

    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryProjectStore::new()),
        )
    }

    pub fn postgres(config: Config, pg: PgPool) -> Self {
        Self::new(
            config,
            Arc::new(PgAccountStore::new(pg.clone())),
            Arc::new(PgProjectStore::new(pg)),
        )
    }
}

fn cors(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring malformed CORS origin `{}`", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(routes::login))
        .route("/users", get(routes::list_users))
        .route("/users/create", post(routes::register))
        .route("/users/upload-csv", post(routes::upload_csv))
        .route("/users/me", get(routes::me))
        .route("/users/update", post(routes::update_me))
        .route("/users/admin/edit/:user_id", put(routes::admin_edit))
        .route("/users/admin/delete/:user_id", delete(routes::admin_delete))
        .route(
            "/users/admin/reset-password/:user_id",
            post(routes::admin_reset_password),
        )
        .route("/projects", post(routes::create_project))
        .route("/projects/", post(routes::create_project))
        .route("/projects/me", get(routes::my_projects));

    Router::new()
        .nest(API_PREFIX, api)
        .nest_service("/static", ServeDir::new(state.config.static_dir.clone()))
        .fallback(err::handler404)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors(&state.config.cors_origins))
        .layer(Extension(state))
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    MediaStore::new(config.static_dir.clone()).prepare_io().await?;

    let (state, pool) = match config.store_backend {
        StoreBackend::Postgres => {
            log::info!("Connecting to Postgres...");
            let pg = store::postgres::connect(&config.database_url).await?;
            (AppState::postgres(config, pg.clone()), Some(pg))
        }
        StoreBackend::Memory => {
            log::warn!("Using the in-memory store, nothing will be persisted");
            (AppState::in_memory(config), None)
        }
    };

    let address = state.config.address();
    let app = build_router(state);
    let listener = TcpListener::bind(&address).await?;
    log::info!("Starting UniRepo HTTP Server on http://{}{}", address, API_PREFIX);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pg) = pool {
        pg.close().await;
        log::info!("Database pool closed");
    }
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                log::error!("Failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
