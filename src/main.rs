use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use labscribe::{
    config::Config,
    db::Database,
    extractor::HttpExtractor,
    notify::Hub,
    pipeline::{deps::Deps, orchestrator::BatchOrchestrator, scheduler::AdaptiveScheduler},
    routes,
    store::{lab_reports::PgReportStore, ocr_jobs::PgJobStore, users::PgUserStore, workspaces::PgWorkspaceStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info").add_directive("labscribe=info".parse().unwrap()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    println!("\n🚀 LABSCRIBE APPLICATION STARTUP");
    println!("{}", "=".repeat(60));

    let config = match Config::from_env() {
        Ok(cfg) => {
            println!("✅ Configuration loaded and validated successfully");
            cfg
        }
        Err(e) => {
            println!("❌ CRITICAL: Configuration loading failed!");
            println!("Error: {}", e);
            return Err(e);
        }
    };
    let config = Arc::new(config);

    println!("\n🗄️  DATABASE CONNECTION:");
    println!("{}", "=".repeat(50));

    let db = match Database::new_with_pool_config(&config.database_url, config.database_max_connections, 2).await {
        Ok(db) => {
            println!("✅ Database pool created (max: {} connections)", config.database_max_connections);
            db
        }
        Err(e) => {
            println!("❌ CRITICAL: Failed to connect to database!");
            println!("Error: {}", e);
            return Err(e);
        }
    };

    info!("Running sqlx migrations...");
    sqlx::migrate!("./migrations").run(db.get_pool()).await?;
    info!("✅ Migrations complete");

    let jobs = Arc::new(PgJobStore::new(db.clone()));
    let reports = Arc::new(PgReportStore::new(db.pool.clone()));
    let users = PgUserStore::new(db.pool.clone());
    let workspaces = PgWorkspaceStore::new(db.pool.clone());

    let extractor = Arc::new(HttpExtractor::new(
        config.llm_endpoint_url.clone(),
        config.llm_api_key.clone(),
        Duration::from_millis(config.ai_timeout_ms),
    ));

    let hub = Arc::new(Hub::new(Duration::from_millis(config.heartbeat_interval_ms)));
    Arc::clone(&hub).spawn_heartbeat();

    let deps = Deps {
        jobs: jobs.clone(),
        reports: reports.clone(),
        extractor: extractor.clone(),
        hub: hub.clone(),
        config: config.clone(),
        users,
        workspaces: workspaces.clone(),
    };

    println!("\n📅 PIPELINE INITIALIZATION:");
    println!("{}", "=".repeat(50));

    let orchestrator = Arc::new(BatchOrchestrator::new(
        jobs,
        reports,
        extractor,
        hub.clone(),
        Arc::new(workspaces),
        config.ocr_processor_batch_size,
        config.ocr_processor_immediate_delay_ms,
        config.ocr_processor_delay_ms,
        config.ocr_processor_error_retry_delay_ms,
    ));
    let scheduler = AdaptiveScheduler::new(orchestrator);
    match scheduler.start().await {
        Ok(()) => println!("✅ Adaptive scheduler started"),
        Err(e) => {
            error!(error = %e, "scheduler failed to start");
            return Err(e.into());
        }
    }

    let state = Arc::new(AppState { db, config: config.clone(), hub, deps });
    let app = routes::build_router(state);

    println!("\n🌐 STARTING HTTP SERVER:");
    println!("{}", "=".repeat(50));

    let listener = match tokio::net::TcpListener::bind(&config.server_address).await {
        Ok(listener) => {
            println!("✅ HTTP server bound to: {}", config.server_address);
            listener
        }
        Err(e) => {
            println!("❌ CRITICAL: Failed to bind to address: {}", config.server_address);
            println!("Error: {}", e);
            return Err(e.into());
        }
    };

    println!("\n🎉 LABSCRIBE APPLICATION READY!");
    println!("{}", "=".repeat(60));
    println!("🌐 Server: http://{}", config.server_address);
    println!("📦 Batch size: {}", config.ocr_processor_batch_size);
    println!("{}", "=".repeat(60));

    if config.jwt_secret == "insecure-development-secret" {
        warn!("running with the insecure default SECRET_KEY -- set SECRET_KEY in production");
    }

    info!("labscribe server is now running and accepting connections");
    axum::serve(listener, app).await?;

    Ok(())
}
