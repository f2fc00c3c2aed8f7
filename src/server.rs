use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::{Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::handlers::{
    abort_upload, complete_chunked_upload, delete_share, download_share, get_stats,
    health_check, init_upload, list_shares, share_info, share_link, unlock_share,
    upload_chunk, upload_file, upload_status,
};
use crate::middleware::{add_security_headers, validate_api_key, ApiKeyHash};
use crate::state::AppState;
use crate::utils::shutdown_signal;

type AppRouter = Router<Arc<AppState>>;

fn cors_layer(config: &Config, methods: &[Method]) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods(methods.to_vec())
        .allow_origin(AllowOrigin::list(origins))
        .allow_headers(Any)
}

// single-shot and chunked uploads
fn upload_routes() -> AppRouter {
    Router::new()
        .route("/api/upload", post(upload_file))
        .route("/api/upload/init", post(init_upload))
        .route("/api/upload/:id", get(upload_status).delete(abort_upload))
        .route("/api/upload/:id/chunk/:index", put(upload_chunk).post(upload_chunk))
        .route("/api/upload/:id/complete", post(complete_chunked_upload))
}

// everything a recipient touches
fn share_routes() -> AppRouter {
    Router::new()
        .route("/api/share/:id", get(share_info))
        .route("/api/share/:id/unlock", post(unlock_share))
        .route("/api/share/:id/download", get(download_share))
        .route("/s/:id", get(share_link))
}

/// public router: uploads, share info and downloads
pub fn build_public_router(state: Arc<AppState>) -> Router {
    let config = &state.config;
    tracing::debug!(
        max_upload_size = config.max_upload_size,
        chunk_size = config.chunk_size,
        "Building public router"
    );

    let cors = cors_layer(config, &[Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    upload_routes()
        .merge(share_routes())
        .route("/health", get(health_check))
        .layer(axum::middleware::from_fn(add_security_headers))
        // multipart has its own 2MB default, lift it to the configured limit
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(RequestBodyLimitLayer::new(config.max_upload_size))
        .layer(CompressionLayer::new().gzip(true).br(true).zstd(true))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// admin routes behind api key validation, without rate limiting
pub fn admin_routes(state: Arc<AppState>) -> Router {
    let api_key_hash = ApiKeyHash(state.config.api_key_hash.clone());

    Router::new()
        .route("/admin/shares", get(list_shares))
        .route("/admin/shares/:id", delete(delete_share))
        .route("/admin/stats", get(get_stats))
        .route("/admin/health", get(health_check))
        .layer(axum::middleware::from_fn(validate_api_key))
        .layer(Extension(api_key_hash))
        .layer(axum::middleware::from_fn(add_security_headers))
        .with_state(state)
}

/// admin router: api key, rate limit, cors
pub fn build_admin_router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();

    // one token every (60 / per-minute) seconds, bursts of 5
    let replenish_secs = (60 / config.rate_limit_per_minute.max(1)).max(1);
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(replenish_secs)
        .burst_size(5)
        .finish()
        .map(Arc::new);

    let cors = cors_layer(&config, &[Method::GET, Method::DELETE]);

    // vroom vroom
    let router = admin_routes(state);
    let router = match governor_conf {
        Some(limits) => router.layer(GovernorLayer { config: limits }),
        None => {
            tracing::warn!("Invalid rate limit settings, admin api is not rate limited");
            router
        }
    };
    router.layer(cors).layer(TraceLayer::new_for_http())
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let token = shutdown.clone();
    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { token.cancelled().await })
        .tcp_nodelay(true)
        .await;

    if let Err(e) = &result {
        tracing::error!(server = name, "Server error: {}", e);
    }
    // one server going away takes the other one with it
    shutdown.cancel();
    result
}

/// bind both listeners and serve until ctrl-c / SIGTERM
pub async fn start_servers(
    public_app: Router,
    admin_app: Router,
    public_addr: SocketAddr,
    admin_addr: SocketAddr,
) -> std::io::Result<()> {
    let public_listener = TcpListener::bind(public_addr).await?;
    let admin_listener = TcpListener::bind(admin_addr).await?;
    tracing::debug!(%public_addr, %admin_addr, "Listeners bound");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.cancel();
    });

    tracing::info!("Servers running and ready to accept connections");
    let (public, admin) = tokio::join!(
        serve("public", public_listener, public_app, shutdown.clone()),
        serve("admin", admin_listener, admin_app, shutdown),
    );
    public.and(admin)
}

/// print startup banner with server info
pub fn print_startup_banner(config: &Config) {
    let expiry = config
        .default_expiry
        .map(|d| format!("{} days", d.num_days()))
        .unwrap_or_else(|| "never".to_string());

    tracing::info!("Juicebox-drop starting...");
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("📡 PUBLIC API: http://{}:{} (links: {})", config.public_host, config.public_port, config.base_url);
    tracing::info!("🔐 ADMIN API: http://{}:{}", config.admin_host, config.admin_port);
    tracing::info!("📁 Data directory: {:?}", config.data_dir.canonicalize().unwrap_or(config.data_dir.clone()));
    tracing::info!("📦 Chunks of {} bytes, sessions expire after {:?} idle", config.chunk_size, config.upload_timeout);
    tracing::info!("⏳ Shares expire after {} by default", expiry);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
