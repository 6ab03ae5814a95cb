use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use bulk_relay::config::Config;
use bulk_relay::conversation::ConversationEngine;
use bulk_relay::dispatch::{BulkMailEngine, DispatchEngine, JitterPolicy, MailConfig};
use bulk_relay::http::{api_routes, ApiState};
use bulk_relay::session::{store, SessionStore};
use bulk_relay::transport::{GatewayTransport, MessageTransport};

/// How often the idle-session sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage (lettre).
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

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export BULK_RELAY_SECRET=...");
        std::process::exit(1);
    });

    let Some(transport) = GatewayTransport::from_env() else {
        eprintln!("Error: GATEWAY_BASE_URL not set");
        eprintln!("  export GATEWAY_BASE_URL=http://localhost:3000");
        std::process::exit(1);
    };
    let transport: Arc<dyn MessageTransport> = Arc::new(transport);

    let jitter = JitterPolicy::from_env();

    eprintln!("📣 bulk-relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.http_port);
    eprintln!(
        "   Jitter: {}-{}ms between recipients, {}-{}ms between payloads",
        jitter.recipient_gap.min_ms,
        jitter.recipient_gap.max_ms,
        jitter.payload_gap.min_ms,
        jitter.payload_gap.max_ms,
    );
    eprintln!("   Uploads: {}", config.download_dir.display());

    // ── Session store ────────────────────────────────────────────────────
    let sessions = SessionStore::new(config.session_idle_timeout);
    let _sweep_handle = store::spawn_sweep_task(Arc::clone(&sessions), SWEEP_INTERVAL);

    // ── Engines ──────────────────────────────────────────────────────────
    let dispatcher = Arc::new(DispatchEngine::new(Arc::clone(&transport), jitter));

    let mail = match MailConfig::from_env() {
        Some(mail_config) => {
            eprintln!(
                "   Mail: enabled (SMTP: {}:{})",
                mail_config.smtp_host, mail_config.smtp_port
            );
            Some(Arc::new(BulkMailEngine::new(mail_config)))
        }
        None => {
            eprintln!("   Mail: disabled");
            None
        }
    };

    let engine = Arc::new(ConversationEngine::new(
        Arc::clone(&sessions),
        Arc::clone(&transport),
        Arc::clone(&dispatcher),
        config.access_secret.clone(),
        config.download_dir.clone(),
    ));

    // ── REST API ─────────────────────────────────────────────────────────
    let app = api_routes(ApiState {
        transport: Arc::clone(&transport),
        dispatcher: Arc::clone(&dispatcher),
        mail,
    });
    let http_port = config.http_port;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{http_port}"))
            .await
            .expect("Failed to bind API port");
        tracing::info!(port = http_port, "REST API started");
        axum::serve(listener, app).await.ok();
    });

    // ── Conversation loop ────────────────────────────────────────────────
    if let Err(e) = transport.health_check().await {
        tracing::warn!("Gateway health check failed: {e}");
    }

    let mut events = transport.start().await?;
    tracing::info!("Conversation loop running");
    while let Some(event) = events.next().await {
        engine.handle(event).await;
    }

    tracing::info!("Event stream closed, shutting down");
    Ok(())
}
