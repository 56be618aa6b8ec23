// Service entry point
//
// Startup order matters: the storage root is cleared in full (artifacts are
// session state and never survive a restart), yt-dlp gets a forced update
// check, and only then do the eviction sweep and the listener come up.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use clipfetch::activity::ActivityLog;
use clipfetch::artifacts::ArtifactStore;
use clipfetch::config::Settings;
use clipfetch::downloader::{CommandGateway, Orchestrator, ToolUpdater};
use clipfetch::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("starting clipfetch...");
    let settings = Arc::new(Settings::from_env_or_default());

    let store = Arc::new(ArtifactStore::new(
        settings.download_dir.clone(),
        settings.max_file_age,
        settings.cleanup_interval,
        settings.post_serve_delete_delay,
    ));
    store.clear().await?;
    info!("cleaned downloads folder on startup");

    let updater = Arc::new(ToolUpdater::new(settings.ytdlp_update_check_interval));
    updater.check(true).await;

    let sweeper = Arc::clone(&store).spawn_sweeper();

    let gateway = Arc::new(CommandGateway::new(&settings));
    let orchestrator = Arc::new(Orchestrator::new(gateway, Arc::clone(&store)));
    let activity = Arc::new(ActivityLog::new(settings.activity_log_path()));

    let state = AppState {
        settings: Arc::clone(&settings),
        store,
        orchestrator,
        updater,
        activity,
    };

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(
        listener,
        server::router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    sweeper.abort();
    Ok(())
}
