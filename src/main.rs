use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use juicebox_drop::config::Config;
use juicebox_drop::server::{build_admin_router, build_public_router, print_startup_banner, start_servers};
use juicebox_drop::state::AppState;
use juicebox_drop::sweeper::Sweeper;

// use mimalloc as the global allocator
// 10-20% faster than system allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    // load .env file if it exists (fails silently if not found)
    let _ = dotenvy::dotenv();

    // tracing first so config warnings show up
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let (public_addr, admin_addr) = match (config.public_addr(), config.admin_addr()) {
        (Ok(public), Ok(admin)) => (public, admin),
        (Err(e), _) => {
            tracing::error!("Invalid PUBLIC_HOST {:?}: {}", config.public_host, e);
            return ExitCode::FAILURE;
        }
        (_, Err(e)) => {
            tracing::error!("Invalid ADMIN_HOST {:?}: {}", config.admin_host, e);
            return ExitCode::FAILURE;
        }
    };

    // build tokio runtime with configured worker threads
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to build Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        // shares/ and uploads/ under the data directory
        let state = match AppState::new(config.clone()) {
            Ok(state) => Arc::new(state),
            Err(e) => {
                tracing::error!("Failed to prepare data directory {:?}: {}", config.data_dir, e);
                return ExitCode::FAILURE;
            }
        };

        // first sweep runs right away, then every SWEEP_INTERVAL_SECS
        let sweeper = Sweeper::new(
            Arc::clone(&state.shares),
            Arc::clone(&state.uploads),
            config.sweep_interval,
            config.upload_timeout,
        )
        .spawn();

        let public_app = build_public_router(Arc::clone(&state));
        let admin_app = build_admin_router(state);

        print_startup_banner(&config);

        let served = start_servers(public_app, admin_app, public_addr, admin_addr).await;

        sweeper.shutdown().await;
        match served {
            Ok(()) => {
                tracing::info!("Shutdown complete");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Server failed: {}", e);
                ExitCode::FAILURE
            }
        }
    })
}
