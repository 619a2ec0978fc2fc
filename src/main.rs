use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use agri_assist::administrative::{AdministrativeLevel, load_seed_file, seed_administrative};
use agri_assist::channels::CliChannel;
use agri_assist::config::AppConfig;
use agri_assist::llm::create_provider;
use agri_assist::onboarding::{OnboardingRouteState, OnboardingService, onboarding_routes};
use agri_assist::store::{Database, LibSqlBackend};

/// `--cli <phone>` runs the REPL simulator for that number.
fn cli_phone_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--cli" {
            return Some(args.next().unwrap_or_else(|| "+10000000000".to_string()));
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    eprintln!("🌱 Agri Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.database.path)
            .await
            .with_context(|| {
                format!(
                    "failed to open database at {}",
                    config.database.path.display()
                )
            })?,
    );
    eprintln!("   Database: {}", config.database.path.display());

    // ── Administrative seed ──────────────────────────────────────────────
    if let Some(seed_path) = &config.admin_seed_path {
        let existing = db
            .list_administrative_by_level(AdministrativeLevel::Ward)
            .await?;
        if existing.is_empty() {
            let roots = load_seed_file(seed_path)
                .with_context(|| format!("failed to load seed {}", seed_path.display()))?;
            let inserted = seed_administrative(db.as_ref(), &roots).await?;
            eprintln!("   Seeded {inserted} administrative areas");
        } else {
            tracing::info!(wards = existing.len(), "Administrative data present, skipping seed");
        }
    }

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    if !llm.is_configured() {
        eprintln!("   Warning: OPENAI_API_KEY not set, extraction is disabled");
    }

    let service = Arc::new(OnboardingService::new(
        Arc::clone(&db),
        llm,
        config.matcher.clone(),
        &config.onboarding,
    ));

    // ── CLI simulator ────────────────────────────────────────────────────
    if let Some(phone) = cli_phone_arg() {
        eprintln!("   Mode: CLI simulator\n");
        CliChannel::new(service, phone).run().await?;
        return Ok(());
    }

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = onboarding_routes(OnboardingRouteState { service }).layer(CorsLayer::permissive());
    let port = config.server.http_port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    eprintln!("   API: http://0.0.0.0:{port}/api/onboarding/messages\n");
    tracing::info!(port, "Onboarding server started");
    axum::serve(listener, app).await?;

    Ok(())
}
