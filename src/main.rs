use clap::Parser;
use log::{error, info};
use std::sync::Arc;

use powergrid::analytics::LogAnalytics;
use powergrid::server::{router, AppState};
use powergrid::{GameManager, MapRegistry, ServerConfig, SessionManager, VERSION};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();

    let mut maps = MapRegistry::builtin();
    if let Some(dir) = &config.maps_dir {
        match maps.load_dir(dir) {
            Ok(count) => info!("🗺️ Loaded {} maps from {}", count, dir.display()),
            Err(e) => error!("❌ Could not load maps from {}: {}", dir.display(), e),
        }
    }

    let games = GameManager::new(Arc::new(maps), config.game_rules())
        .with_analytics(Arc::new(LogAnalytics));
    info!("🗺️ Maps available: {}", games.map_names().join(", "));
    let sessions = SessionManager::new(games, config.session_config());
    sessions.start().await;

    let app = router(AppState::new(sessions.clone()));
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("⚡ Power Grid server v{} listening on {}", VERSION, config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("🛑 Shutdown requested");
        })
        .await?;

    sessions.shutdown().await;
    Ok(())
}
