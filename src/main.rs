//! # SignalDeck gateway
//!
//! Starts one view controller per configured view against the analytics
//! backend and serves their state to the dashboard.
//!
//! ## Environment Variables
//!
//! | Variable        | Default                 | Description                       |
//! |-----------------|-------------------------|-----------------------------------|
//! | `BIND_ADDR`     | `0.0.0.0:3000`          | Address Axum listens on           |
//! | `BACKEND_URL`   | `http://localhost:8000` | Base URL of the analytics backend |
//! | `VIEWS`         | `vcp,flow,macro`        | Dashboard views to keep fresh     |
//! | `RUST_LOG`      | `signaldeck=debug`      | Tracing filter                    |
//!
//! Cadences and limits are listed in [`signaldeck::config`].

use std::sync::Arc;

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use signaldeck::{
    client::{HttpBackend, SignalBackend},
    config::DeckConfig,
    routes::router,
    state::build_state,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("signaldeck=debug".parse()?)
                .add_directive("tower_http=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           SIGNALDECK — Dashboard Core                 ║
  ║  Scheduler · Probe · Reconciler · Overlay Compiler    ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = DeckConfig::from_env()?;
    info!(backend = %config.backend_url, views = config.views.len(), "Configuration loaded");

    // ── 4. Backend client + views ─────────────────────────────────────────────
    let backend: Arc<dyn SignalBackend> =
        Arc::new(HttpBackend::new(reqwest::Client::new()).with_base_url(&config.backend_url));
    let state = build_state(config.views.clone(), backend).context("failed to start views")?;

    // ── 5. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let app = router(Arc::clone(&state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    info!(addr = ?config.bind_addr, "🚀 SignalDeck server starting");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // ── 8. Teardown ───────────────────────────────────────────────────────────
    state.shutdown().await;
    info!("👋 SignalDeck stopped");

    Ok(())
}
