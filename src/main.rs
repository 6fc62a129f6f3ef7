use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, middleware::Compress};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod export;
mod models;
mod notify;
mod openapi;
mod rate_limit;
mod repo;
mod routes;
mod security;

use notify::LogNotifier;
use openapi::ApiDoc;
use rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
use repo::inmem::InMemRepo;
use routes::{config, AppState};
use security::SecurityHeaders;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

async fn metrics_endpoint(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/plain; version=0.0.4"))
        .body(handle.render())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment comes from the shell / systemd / container runtime; load
    // .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping report moderation service");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        crate::repo::pg::PgRepo::new(pool)
    };

    let rate_limiter = RateLimiterFacade::new(
        InMemoryRateLimiter::new(
            std::env::var("RL_DISABLED")
                .map(|v| v != "1")
                .unwrap_or(true),
        ),
        RateLimitConfig::from_env(),
    );

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env().with_hsts(true))
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .route("/metrics", web::get().to(metrics_endpoint))
            .app_data(web::Data::new(prometheus.clone()))
            .app_data(web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                notifier: Arc::new(LogNotifier),
                rate_limiter: rate_limiter.clone(),
            }))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut missing = Vec::new();
    for var in ["JWT_SECRET"] {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {missing:?}");
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }
}
