//! HTTP adapter for gatehouse: axum routes over a SQLite user store and a
//! Redis (or in-process) session store.

pub mod config;
pub mod error;
pub mod routes;
pub mod session_store;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use gatehouse_api::memory::MemorySessionStore;
use gatehouse_api::registration::RegistrationFlow;
use gatehouse_api::session::SessionManager;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use session_store::SessionBackend;
use storage::Db;

pub type Sessions = SessionManager<Db, SessionBackend>;
pub type Registration = RegistrationFlow<Db>;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<Sessions>,
    pub registration: Arc<Registration>,
    pub backend: SessionBackend,
}

impl FromRef<AppState> for Arc<Sessions> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<Registration> {
    fn from_ref(state: &AppState) -> Self {
        state.registration.clone()
    }
}

impl AppState {
    /// Open both stores and wire the services.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let db = storage::init_db(&config.database, config.db_pool_size)?;
        tracing::info!("database initialized");

        let backend = SessionBackend::from_url(config.redis_url.as_deref()).await?;
        Ok(Self::new(db, backend, config))
    }

    pub fn new(db: Db, backend: SessionBackend, config: &ServerConfig) -> Self {
        let hasher = config.hasher.build();
        tracing::info!(hasher = %config.hasher, "password hasher selected");
        let sessions = SessionManager::new(
            db.clone(),
            backend.clone(),
            hasher.clone(),
            config.session.clone(),
        );
        let registration = RegistrationFlow::new(db, hasher, config.registration.clone());
        Self {
            sessions: Arc::new(sessions),
            registration: Arc::new(registration),
            backend,
        }
    }
}

/// Build the full router with `/api` routes, tracing and CORS.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health::health))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/logout", post(routes::auth::logout));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Periodically drop expired in-process sessions. Redis expires keys itself.
pub fn spawn_session_sweeper(
    store: MemorySessionStore,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "swept expired sessions");
            }
        }
    })
}

/// Bind and serve until the listener fails or `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let sweeper = state
        .backend
        .as_memory()
        .cloned()
        .map(|store| spawn_session_sweeper(store, Duration::from_secs(60)));

    let app = build_router(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_sessions() {
        use gatehouse_api::store::SessionStore;

        let store = MemorySessionStore::new();
        store.set_ex("session:a", "1", 5).await.unwrap();
        store.set_ex("session:b", "2", 500).await.unwrap();

        let handle = spawn_session_sweeper(store.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.len().await, 1);
        handle.abort();
    }
}
