use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use usapan::config::{Cli, Command, Config};
use usapan::db;
use usapan::routes;
use usapan::state::{AppState, DbPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path(), config.database.pool_size)?;
    db::run_migrations(&pool)?;

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Migrate => Ok(()),
        Command::Notice { from, title, body } => {
            let state = AppState::from_config(pool, config)?;
            let broadcast = state.social.broadcast_notice(&from, &title, &body).await?;
            println!(
                "Sent notice {} to {} profile(s)",
                broadcast.notice_id, broadcast.recipients
            );
            if broadcast.failed > 0 {
                eprintln!("{} profile(s) could not be notified", broadcast.failed);
            }
            // Let queued pushes finish before the runtime shuts down
            if state.config.push.gateway_url.is_some() {
                tokio::time::sleep(state.config.push_timeout()).await;
            }
            Ok(())
        }
        Command::Serve => serve(pool, config).await,
    }
}

async fn serve(pool: DbPool, config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::app(AppState::from_config(pool, config)?);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
