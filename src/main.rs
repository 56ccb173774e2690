use candlebot::api::BinanceClient;
use candlebot::config::Settings;
use candlebot::engine::ReferenceEngine;
use candlebot::notify::{LogNotifier, NotificationSink, TelegramNotifier};
use candlebot::stream::ConnectionHandle;
use candlebot::trader::TraderSupervisor;
use candlebot::Result;
use clap::Parser;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "candlebot",
    about = "Streaming candle ingestion with trade lifecycle tracking"
)]
struct Cli {
    /// Settings file (TOML/JSON/YAML; extension may be omitted)
    #[arg(short, long, default_value = "candlebot")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    tracing::info!("🚀 CandleBot starting");

    let settings = Settings::load(&cli.config)?;

    let notifier: Arc<dyn NotificationSink> = match &settings.telegram {
        Some(telegram) => {
            tracing::info!("📨 Telegram notifications enabled");
            Arc::new(TelegramNotifier::new(
                telegram.bot_token.clone(),
                telegram.chat_id.clone(),
            ))
        }
        None => {
            tracing::info!("📨 No Telegram settings, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    tracing::info!("📊 Configuration: {} trader(s)", settings.traders.len());
    for trader in &settings.traders {
        tracing::info!("  - {}", trader.label());
    }

    let mut handles: Vec<ConnectionHandle> = Vec::new();
    let mut tasks = Vec::new();

    for config in settings.traders.clone() {
        let label = config.label();
        let mut trader = TraderSupervisor::new(
            config,
            BinanceClient::new(),
            Box::new(ReferenceEngine::new()),
            notifier.clone(),
        );

        // A trader that cannot take its initial snapshot never starts.
        trader.initialize().await?;

        let (manager, handle) = trader.open_connection(&settings.connection);
        handles.push(handle);
        tasks.push(tokio::spawn(async move {
            if let Err(err) = trader.run_with(manager).await {
                tracing::error!("❌ [{}] trader stopped: {}", label, err);
            }
        }));
    }

    tracing::info!("✅ All traders running. Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("⚠️  Received Ctrl+C, shutting down...");

    for handle in &handles {
        handle.stop();
    }
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("👋 CandleBot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "candlebot=info".into()),
        )
        .init();
}
