use actix_web::middleware::{NormalizePath, from_fn};
use actix_web::web::{self, Data};
use actix_web::{App, HttpResponse, HttpServer, Responder, get};
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
#[cfg(test)]
mod testing;
mod utils;

use config::Config;
use db::init_db;

use crate::auth::middleware::origin_guard;
use crate::docs::ApiDoc;
use crate::error::{json_error_handler, query_error_handler};
use crate::routes::RateLimits;
use crate::utils::{email_cache, email_filter};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // the logger needs LOG_DIR from a valid config
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "shabra.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(env = ?config.app_env, addr = %config.server_addr, "Server starting...");
    if !config.is_production() {
        warn!("Development mode: missing settings fall back to defaults");
    }

    let pool = init_db(&config.database_url).await?;

    if config.run_migrations {
        db::run_migrations(&pool).await?;
    }

    if let Some(seed) = &config.seed_admin {
        match db::seed_admin(&pool, seed).await {
            Ok(true) => info!("Bootstrap admin created"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Seeding admin failed"),
        }
    }

    let limits = RateLimits::from_config(&config)?;

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = email_filter::warmup_email_filter(&pool_for_filter_warmup, 500).await {
            error!(error = ?e, "Failed to warm up email filter");
        }
    });

    actix_web::rt::spawn(async move {
        // users seen in the last 30 days, in batches of 250
        if let Err(e) = email_cache::warmup_email_cache(&pool_for_cache_warmup, 30, 250).await {
            error!(error = ?e, "Failed to warm up email cache");
        }
    });

    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        let config_for_routes = config.clone();
        let limits = limits.clone();

        App::new()
            .wrap(from_fn(origin_guard))
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard so JS/CSS assets resolve
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .service(health)
            .configure(move |cfg| routes::configure(cfg, &config_for_routes, &limits))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
