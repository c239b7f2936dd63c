use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use vitrine::auth::google::OauthStateStore;
use vitrine::config::{Cli, Config};
use vitrine::outbound::{LogMailer, LogSmsGateway};
use vitrine::state::AppState;
use vitrine::store::TreeStore;
use vitrine::{app_router, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;
    let store = TreeStore::new(pool.clone());

    if config.google.is_none() {
        tracing::warn!("Google sign-in disabled: no [google] config section");
    }

    let state = AppState {
        db: pool,
        store,
        config: config.clone(),
        mailer: Arc::new(LogMailer),
        sms: Arc::new(LogSmsGateway),
        oauth_states: Arc::new(Mutex::new(OauthStateStore::default())),
    };

    let app = app_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
