// src/main.rs - LabMS reporting backend
use actix_web::{
    middleware::{Logger, DefaultHeaders, Compress},
    web, App, HttpServer,
};
use actix_web::http::header;
use actix_cors::Cors;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use sqlx::{sqlite::SqliteConnectOptions, migrate::MigrateDatabase, Sqlite, SqlitePool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Module declarations
mod booking_handlers;
mod config;
mod db;
mod equipment_handlers;
mod error;
mod handlers;
mod maintenance_handlers;
mod models;
mod monitoring;
mod report_handlers;
pub mod reports;

use config::{load_config, Config};
use monitoring::{Metrics, RequestLogger, start_maintenance_tasks};
use reports::{ReportService, SqliteReportStore};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub report_service: ReportService,
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (this calls load_env_file internally)
    let config = load_config()?;

    // Setup logging
    setup_logging(&config)?;

    // Validate production config
    if env::var("LABMS_ENV").as_deref() == Ok("production") {
        validate_production_config(&config)?;
    }

    config.print_startup_info();

    // Setup database
    setup_database(&config.database.url).await?;

    // Create database pool
    let pool = create_database_pool(&config.database).await?;

    // Run migrations
    db::run_migrations(&pool).await?;

    // Report service reads through the typed store interface
    let report_service = ReportService::new(Arc::new(SqliteReportStore::new(pool.clone())));

    // Create app state
    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
        report_service,
    });

    // Start background tasks
    let pool_clone = pool.clone();
    tokio::spawn(async move {
        start_maintenance_tasks(pool_clone).await;
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    // Create metrics
    let metrics_arc = Arc::new(Metrics::new());
    let metrics = web::Data::from(metrics_arc.clone());

    let workers = config.server.workers;
    let keep_alive = config.server.keep_alive;
    let client_timeout = config.server.client_timeout;

    let mut server = HttpServer::new(move || {
        let cors = setup_cors(&config.security.allowed_origins);
        let security_headers = setup_security_headers(&config.security);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(metrics.clone())
            .app_data(web::JsonConfig::default().limit(config.security.max_request_size))

            // Health check and metrics (no envelope)
            .service(
                web::scope("/health")
                    .route("", web::get().to(monitoring::health_check))
                    .route("/ready", web::get().to(monitoring::readiness_check))
                    .route("/metrics", web::get().to(monitoring::metrics_endpoint))
            )

            // API endpoints
            .service(
                web::scope("/api/v1")
                    // Dashboard
                    .service(
                        web::scope("/dashboard")
                            .route("/stats", web::get().to(report_handlers::get_dashboard_stats))
                    )

                    // Labs
                    .service(
                        web::scope("/labs")
                            .route("", web::get().to(handlers::get_all_labs))
                            .route("", web::post().to(handlers::create_lab))
                            .route("/{id}", web::get().to(handlers::get_lab))
                            .route("/{id}", web::put().to(handlers::update_lab))
                            .route("/{id}", web::delete().to(handlers::delete_lab))
                    )

                    // Users
                    .service(
                        web::scope("/users")
                            .route("", web::get().to(handlers::get_users))
                            .route("", web::post().to(handlers::create_user))
                            .route("/{id}", web::get().to(handlers::get_user))
                    )

                    // Equipment
                    .service(
                        web::scope("/equipment")
                            .route("", web::post().to(equipment_handlers::create_equipment))
                            .route("", web::get().to(equipment_handlers::get_equipment))
                            .route("/{id}", web::get().to(equipment_handlers::get_equipment_by_id))
                            .route("/{id}", web::put().to(equipment_handlers::update_equipment))
                            .route("/{id}", web::delete().to(equipment_handlers::delete_equipment))
                    )

                    // Bookings
                    .service(
                        web::scope("/bookings")
                            .route("", web::get().to(booking_handlers::get_bookings))
                            .route("", web::post().to(booking_handlers::create_booking))
                            .route("/{id}", web::get().to(booking_handlers::get_booking))
                            .route("/{id}", web::delete().to(booking_handlers::delete_booking))
                            .route("/{id}/confirm", web::post().to(booking_handlers::confirm_booking))
                            .route("/{id}/complete", web::post().to(booking_handlers::complete_booking))
                            .route("/{id}/cancel", web::post().to(booking_handlers::cancel_booking))
                    )

                    // Maintenance
                    .service(
                        web::scope("/maintenance")
                            .route("", web::get().to(maintenance_handlers::get_maintenance_records))
                            .route("", web::post().to(maintenance_handlers::create_maintenance))
                            .route("/{id}", web::get().to(maintenance_handlers::get_maintenance_record))
                            .route("/{id}", web::put().to(maintenance_handlers::update_maintenance))
                            .route("/{id}", web::delete().to(maintenance_handlers::delete_maintenance))
                            .route("/{id}/complete", web::post().to(maintenance_handlers::complete_maintenance))
                    )

                    // Reports
                    .service(
                        web::scope("/reports")
                            .route("/types", web::get().to(report_handlers::get_report_types))
                            .route("/generate", web::post().to(report_handlers::generate_report))
                            .route("/export", web::post().to(report_handlers::export_report))
                    )
            )
    })
    .keep_alive(Duration::from_secs(keep_alive))
    .client_request_timeout(Duration::from_secs(client_timeout));

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)?
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

pub fn setup_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::USER_AGENT,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH, header::CONTENT_DISPOSITION])
        .max_age(3600);

    if allowed_origins.contains(&"*".to_string()) {
        // validate_production_config уже отклонил wildcard в production
        log::warn!("⚠️  Using wildcard CORS (*) in development mode");
        cors = cors.allow_any_origin().allow_any_header().allow_any_method();
    } else {
        for origin in allowed_origins {
            if origin.is_empty() {
                continue;
            }
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            let level = config.logging.level.as_str();
            tracing_subscriber::EnvFilter::new(level)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.security.allowed_origins.contains(&"*".to_string()) {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    if config.database.url.contains(":memory:") {
        anyhow::bail!("In-memory database not allowed in production!");
    }

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(db_config: &crate::config::DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_config.url.trim_start_matches("sqlite:"))
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .idle_timeout(Duration::from_secs(db_config.idle_timeout))
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn setup_security_headers(config: &crate::config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload"
        ));
    }

    headers
}
