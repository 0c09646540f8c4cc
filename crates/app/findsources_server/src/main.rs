//! Find Sources server binary.
//!
//! One process runs one service: the producer API (external login and
//! author references), the admin console API, or the consumer search proxy.

use std::sync::Arc;

use axum::Router;
use clap::{Parser, ValueEnum};
use findsources_api::config::ApiConfig;
use findsources_api::{AppState, SearchState, admin_router, consumer_router, producer_router};
use findsources_core::auth::one_time::OneTimeTokenCache;
use findsources_core::clock::{Clock, SystemClock};
use findsources_core::identity::build_provider;
use findsources_core::store::open_store;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Service {
    Admin,
    Producer,
    Consumer,
}

/// CLI arguments. Everything else comes from the environment.
#[derive(Parser, Debug)]
#[command(name = "findsources_server", about = "Find Sources API server")]
struct Args {
    /// Which service to run.
    #[arg(long, value_enum, default_value_t = Service::Producer)]
    service: Service,

    /// Port to listen on. Overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL, used when `DATABASE_TYPE=postgres`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

fn with_port(bind_addr: &str, port: u16) -> String {
    let host = bind_addr.rsplit_once(':').map_or(bind_addr, |(host, _)| host);
    format!("{host}:{port}")
}

async fn build_app(args: &Args, config: ApiConfig) -> Result<Router, Box<dyn std::error::Error>> {
    let http = reqwest::Client::new();
    if args.service == Service::Consumer {
        info!(
            host = %config.elasticsearch_host,
            index = %config.elasticsearch_index,
            "proxying searches"
        );
        return Ok(consumer_router(SearchState::new(config, http)));
    }

    let stores = open_store(
        config.database_type,
        config.database_url.as_deref(),
        args.max_connections,
    )
    .await?;
    let provider = build_provider(config.auth_provider, config.provider.clone(), http);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let one_time = Arc::new(OneTimeTokenCache::with_clock(clock.clone()));
    one_time.spawn_sweep_task();

    let state = AppState::new(config, stores, provider, one_time, clock);

    if args.service == Service::Admin {
        match (std::env::var("ADMIN_USERNAME"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) => {
                state.operators.seed_operator(&username, &password).await?;
                info!(%username, "seeded admin operator");
            }
            _ => warn!("ADMIN_USERNAME/ADMIN_PASSWORD not set, no operator seeded"),
        }
        return Ok(admin_router(state));
    }
    Ok(producer_router(state))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,findsources_api=debug,findsources_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    if let Some(port) = args.port {
        config.bind_addr = with_port(&config.bind_addr, port);
    }
    if args.database_url.is_some() {
        config.database_url = args.database_url.clone();
    }
    let bind_addr = config.bind_addr.clone();

    info!(
        service = ?args.service,
        database_type = %config.database_type,
        local = config.local_deployment,
        "starting findsources_server"
    );

    let app = build_app(&args, config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
