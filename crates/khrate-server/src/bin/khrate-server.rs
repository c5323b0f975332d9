use khrate::{RateScraper, Recipes};
use khrate_server::{AppState, ServerConfig, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let config = ServerConfig::from_env().inspect_err(|e| log::error!("{e}"))?;

    let recipes = match &config.recipes_file {
        Some(path) => Recipes::from_file(path)?,
        None => Recipes::default(),
    };

    let scraper = RateScraper::with_chrome(recipes, config.scraper_settings());
    let router = router(AppState::new(scraper));
    let tcp_listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    log::info!("Server running on http://{}", config.bind_address);

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e}");
            }
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}
