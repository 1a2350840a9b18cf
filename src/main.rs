//! Keygate server - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use keygate_lib::api;
use keygate_lib::auth::{AdminKey, ApiSecret};
use keygate_lib::config::Config;
use keygate_lib::db::DbPool;
use keygate_lib::middleware::RequestLogger;
use keygate_lib::services::{self, KeyStore, PrivilegeScheduler, authorizer};

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    Config::from_env().is_ok()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL and KG_API_SECRET must be set");
            error!("  - In production, secrets must not match development defaults");
            error!("  - KG_AUTHORIZER=discord needs KG_DISCORD_BOT_TOKEN, KG_DISCORD_GUILD_ID and KG_DISCORD_ROLE_ID");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Keygate");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for DATABASE_URL, KG_ADMIN_KEY and KG_API_SECRET");
    }
    if config.admin_key.is_none() {
        warn!("KG_ADMIN_KEY is not set, admin endpoints are disabled");
    }

    let pool = match DbPool::new(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    info!("Database connection established");

    if let Err(e) = pool.run_migrations().await {
        error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    let authorizer = match authorizer::from_settings(&config.authorizer) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to initialize authorizer: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Authorizer: {} (grant window: {} seconds)",
        config.authorizer.name(),
        config.keys.grant_window.as_secs()
    );

    let store = KeyStore::new(pool.clone(), config.keys.grant_window, config.keys.max_validity);
    let scheduler = PrivilegeScheduler::new(
        pool.clone(),
        authorizer,
        config.scheduler,
        config.keys.grant_window,
    );

    // Revocations pending from a previous run must be back on schedule before
    // any new grant is handed out.
    match scheduler.recover().await {
        Ok(report) => info!(
            "Recovery complete ({} overdue revoked, {} rescheduled)",
            report.overdue, report.scheduled
        ),
        Err(e) => {
            error!("Failed to recover pending revocations: {}", e);
            std::process::exit(1);
        }
    }

    if let Some(period) = config.scheduler.sweep_interval {
        services::start_sweeper_task(pool.clone(), scheduler.clone(), period);
    } else {
        info!("Sweeper disabled");
    }

    let bind_address = config.bind_address();
    let admin_key = AdminKey::new(config.admin_key.clone());
    let api_secret = ApiSecret::new(config.api_secret.clone());
    let key_policy = config.keys;
    let cors_origin = config.cors_origin.clone();

    let worker_count = if config.is_development() {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                header::ACCEPT,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-api-key"),
                HeaderName::from_static("x-admin-key"),
            ])
            .max_age(3600);
        if let Some(ref origin) = cors_origin {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(cors)
            .wrap(RequestLogger)
            .app_data(api::json_config())
            .app_data(api::query_config())
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(scheduler.clone()))
            .app_data(web::Data::new(admin_key.clone()))
            .app_data(web::Data::new(api_secret.clone()))
            .app_data(web::Data::new(key_policy))
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_redeem_routes)
                    .configure(api::configure_key_routes)
                    .configure(api::configure_openapi_routes),
            )
    });

    server.workers(worker_count).bind(&bind_address)?.run().await
}
