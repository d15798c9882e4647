use std::sync::Arc;

use anyhow::Result;
use forecast_panel::config::{ConfigStore, EnvConfig, LoggingSettings, WeatherSettings};
use forecast_panel::data::collection::ForecastCollection;
use forecast_panel::fetcher::transport::ReqwestTransport;
use forecast_panel::fetcher::{FetchEvent, PollingFetcher};
use forecast_panel::{display, monitoring};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    let env_config = EnvConfig::load();

    // The logger reads its settings from the same file, so load quietly first
    let (store, load_error) = match ConfigStore::load(&env_config.config_path) {
        Ok(store) => (store, None),
        Err(e) => (ConfigStore::default(), Some(e)),
    };

    monitoring::logger::init(&LoggingSettings::from_store(&store))?;

    tracing::info!("Forecast panel starting...");
    if let Some(e) = load_error {
        tracing::warn!("Continuing with empty configuration: {:#}", e);
    }

    let settings = WeatherSettings::from_store(&store, &env_config);
    tracing::info!("Poll interval: {}s", settings.poll_interval.as_secs());

    let collection = Arc::new(ForecastCollection::new());
    let transport = ReqwestTransport::new(settings.request_timeout)?;
    let fetcher = PollingFetcher::new(transport, Arc::clone(&collection), &settings.api_url)?;
    fetcher.configure(settings.latitude, settings.longitude, settings.api_key.clone());

    let mut events = fetcher.subscribe();
    fetcher.start(settings.poll_interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(FetchEvent::Updated) => {
                    for line in display::summary_lines(&collection) {
                        tracing::info!("{}", line);
                    }
                }
                Ok(FetchEvent::Failed { kind, message }) => {
                    tracing::warn!("Forecast stays stale ({} failure): {}", kind, message);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Missed {} forecast events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Shutting down...");
    fetcher.stop();

    Ok(())
}
