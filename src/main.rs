use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chatstore::api::error::json_error_handler;
use chatstore::api::middleware::auth::ApiKeyStore;
use chatstore::api::middleware::rate_limit::RateLimiter;
use chatstore::api::middleware::{ApiKeyAuth, RateLimit};
use chatstore::cli::{
    commands::{Cli, Commands},
    run_cli,
};
use chatstore::config::AppConfig;
use chatstore::db;
use clap::Parser;
use tracing::{error, info};

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        run_cli(cli.command, cli.config);
        return Ok(());
    }

    info!("Starting chatstore server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let api_keys = ApiKeyStore::from_entries(&config.auth.api_keys);
    if api_keys.is_empty() {
        error!("No usable API keys configured");
        std::process::exit(1);
    }
    info!("Loaded {} API key(s)", api_keys.len());

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let rate_limiter = RateLimiter::from_config(&config.rate_limit);

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(api_keys.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .route("/health", web::get().to(health))
            .wrap(ApiKeyAuth)
            .wrap(RateLimit::new(rate_limiter.clone()))
            .configure(chatstore::api::routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
