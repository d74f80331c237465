use std::sync::Arc;

use karmabot::bot::Bot;
use karmabot::config::BotConfig;
use karmabot::ledger::{LedgerRepository, LibSqlLedger};
use karmabot::transport::SlackTransport;
use karmabot::web::{self, BlankView, ViewUrlProvider, WebView};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Tokens are required; everything else has defaults.
    let app_token = std::env::var("SLACK_APP_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: SLACK_APP_TOKEN not set");
        eprintln!("  export SLACK_APP_TOKEN=xapp-...");
        std::process::exit(1);
    });
    let bot_token = std::env::var("SLACK_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: SLACK_BOT_TOKEN not set");
        eprintln!("  export SLACK_BOT_TOKEN=xoxb-...");
        std::process::exit(1);
    });

    let config = BotConfig::from_env()?;

    eprintln!("⚡ karmabot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Max points: {}", config.max_points);
    eprintln!("   Leaderboard limit: {}", config.leaderboard_limit);
    eprintln!("   Self karma: {}", config.self_karma);
    eprintln!("   Reactji votes: {}", config.reactji.enabled);
    eprintln!("   Reply mode: {:?}", config.reply_mode);

    // ── Ledger ───────────────────────────────────────────────────────────
    let db_path =
        std::env::var("KARMABOT_DB_PATH").unwrap_or_else(|_| "./data/karmabot.db".to_string());

    let ledger: Arc<dyn LedgerRepository> = Arc::new(
        LibSqlLedger::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open ledger at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Ledger: {}", db_path);

    // ── Web view ─────────────────────────────────────────────────────────
    let view: Arc<dyn ViewUrlProvider> = match std::env::var("KARMABOT_WEB_URL") {
        Ok(url) if !url.is_empty() => Arc::new(WebView::new(url)),
        _ => Arc::new(BlankView),
    };

    if let Ok(addr) = std::env::var("KARMABOT_WEB_ADDR") {
        let app = web::routes(Arc::clone(&ledger), config.leaderboard_limit);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to bind web address {}: {}", addr, e);
                std::process::exit(1);
            });
        eprintln!("   Web API: http://{}/leaderboard", addr);
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
    }

    // ── Transport + bot ──────────────────────────────────────────────────
    let transport = Arc::new(SlackTransport::new(app_token.into(), bot_token.into()));

    let bot = Bot::new(config, ledger, transport, view);
    bot.run().await?;

    Ok(())
}
