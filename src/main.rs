use std::sync::Arc;

use anyhow::Context;

use opsbridge::channels::WhatsAppClient;
use opsbridge::config::ServerConfig;
use opsbridge::crm::{CrmAdapter, VtigerClient};
use opsbridge::llm::{LlmConfig, create_provider};
use opsbridge::pipeline::{InboundProcessor, InboundSettings};
use opsbridge::publish::{CallbackHandler, PublishDispatcher};
use opsbridge::server::{self, AppState};
use opsbridge::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;

    eprintln!("opsbridge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Listening: http://0.0.0.0:{}", config.port);
    eprintln!("   Callback URL: {}", config.callback_url());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Integrations ─────────────────────────────────────────────────────
    let crm: Arc<dyn CrmAdapter> = Arc::new(VtigerClient::new(config.crm_timeout)?);
    let llm = create_provider(&llm_config)?;
    let sender = Arc::new(
        WhatsAppClient::new(config.send_timeout)?.with_graph_base(config.graph_api_base.clone()),
    );

    let inbound = InboundProcessor::new(
        Arc::clone(&db),
        Arc::clone(&crm),
        llm,
        sender,
        InboundSettings {
            crm_timeout: config.crm_timeout,
            generation_timeout: llm_config.timeout,
            history_window: config.history_window,
        },
    );

    // ── Publishing ───────────────────────────────────────────────────────
    let dispatcher = PublishDispatcher::new(
        Arc::clone(&db),
        config.automation_webhook_url.clone(),
        config.callback_url(),
        config.automation_timeout,
    )?;
    let callbacks = CallbackHandler::new(Arc::clone(&db), config.callback_secret.clone());
    eprintln!(
        "   Automation: {}",
        config
            .automation_webhook_url
            .as_deref()
            .unwrap_or("per-tenant only (manual publish otherwise)")
    );
    if config.callback_secret.is_none() {
        tracing::warn!("OPSBRIDGE_CALLBACK_SECRET is not set; automation callbacks are unauthenticated");
    }

    let app = server::router(AppState {
        db,
        crm,
        inbound: Arc::new(inbound),
        dispatcher: Arc::new(dispatcher),
        callbacks: Arc::new(callbacks),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
