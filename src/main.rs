use candlesync::SyncError;
use candlesync::config::{AppConfig, fetch_config};
use candlesync::history::fetch_instruments;
use candlesync::models::{InstrumentKey, Timeframe};
use candlesync::orchestrator::{Orchestrator, SessionState};
use candlesync::store::ChartEvent;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = fetch_config()?;

    let Some(key) = select_key(&config).await? else {
        error!("No instrument available; pass SYMBOL TIMEFRAME, e.g. BTCUSDT@BINANCE 1m");
        return Ok(());
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(&event);
        }
    });

    let mut orchestrator = Orchestrator::from_config(&config, tx);
    orchestrator.start(key).await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {e}");
                }
                info!("Shutting down");
                break;
            }
            () = orchestrator.step() => {
                if orchestrator.state() == SessionState::Idle {
                    warn!("Session ended");
                    break;
                }
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

/// Picks the series from the command line, or the first one the server offers.
async fn select_key(config: &AppConfig) -> Result<Option<InstrumentKey>, SyncError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [symbol, timeframe] = args.as_slice() {
        let timeframe: Timeframe = timeframe.parse()?;
        return InstrumentKey::from_symbol(symbol, timeframe).map(Some);
    }

    let client = reqwest::Client::new();
    let instruments = match fetch_instruments(&client, &config.api_url).await {
        Ok(instruments) => instruments,
        Err(e) => {
            error!("{e}");
            Vec::new()
        }
    };

    Ok(instruments.iter().flat_map(|i| i.keys()).next())
}

fn render(event: &ChartEvent) {
    match event {
        ChartEvent::Cleared => info!("Chart cleared"),
        ChartEvent::Snapshot(candles) => {
            info!(
                candles = candles.len(),
                first = ?candles.first().map(|c| c.time),
                last = ?candles.last().map(|c| c.time),
                "Chart snapshot"
            );
        }
        ChartEvent::Candle(candle) => {
            info!(
                time = candle.time,
                open = %candle.open,
                high = %candle.high,
                low = %candle.low,
                close = %candle.close,
                volume = ?candle.volume,
                "Candle"
            );
        }
    }
}
