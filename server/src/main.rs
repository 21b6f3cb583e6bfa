use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use booklib_server::books::catalog::CatalogClient;
use booklib_server::config::{generate_config_template, CliArgs, Config};
use booklib_server::state::{AppState, Keepalive, SessionSettings};
use booklib_server::{auth, db, routes, ws};

/// How long in-flight events get to drain after the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    // Initialize tracing/logging
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("booklib_server=info,tower_http=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter()).init();
    }

    tracing::info!("Booklib server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    auth::session::spawn_session_sweeper(db.clone(), config.session_sweep_interval_secs);

    // Live updates: one channel, one delivery loop for the whole process
    let live = config.live();
    let connections = ws::ConnectionRegistry::new();
    let (notifier, events) = ws::broadcast::channel(live.broadcast_capacity);
    let delivery = ws::broadcast::spawn_delivery_loop(events, connections.clone());

    let catalog = config.catalog();
    let app_state = AppState {
        db,
        connections,
        notifier,
        catalog: CatalogClient::new(catalog.url, Duration::from_secs(catalog.timeout_secs)),
        sessions: SessionSettings {
            ttl: chrono::Duration::hours(config.session_ttl_hours),
            secure_cookies: config.secure_cookies,
        },
        keepalive: (live.ping_interval_secs > 0).then(|| Keepalive {
            interval: Duration::from_secs(live.ping_interval_secs),
            pong_timeout: Duration::from_secs(live.pong_timeout_secs.max(1)),
        }),
        static_dir: config.static_dir.clone(),
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Listener stopped, draining live updates");
    let mut delivery = delivery;
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut delivery).await.is_err() {
        delivery.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
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
