use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::middleware::{ErrorHandlers, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use env_logger::Env;
use forumdb::config::Config;
use forumdb::middleware::SlowRequest;
use forumdb::store::PostgresRepository;
use forumdb::{ForumService, Repository};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_lib_mods();
    let config = Config::from_env()?;

    let db = forumdb::db::connect(&config)
        .await
        .context("Database connection was not established.")?;
    if config.init_schema {
        forumdb::db::init_schema(&db)
            .await
            .context("Database schema failed to apply.")?;
    }

    let repo: Arc<dyn Repository> = Arc::new(PostgresRepository::new(db));
    let service = Data::new(ForumService::new(repo));
    let slow_request = SlowRequest::new(config.slow_request);

    log::info!("listening on {}", config.bind_address);
    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(service.clone())
            .wrap(
                ErrorHandlers::new()
                    .handler(StatusCode::NOT_FOUND, forumdb::web::error::render_404)
                    .handler(
                        StatusCode::METHOD_NOT_ALLOWED,
                        forumdb::web::error::render_405,
                    ),
            )
            .wrap(slow_request)
            .wrap(Logger::new("%a \"%r\" %s %Dms"))
            .configure(forumdb::web::configure)
    })
    .bind(&config.bind_address)
    .with_context(|| format!("Cannot bind {}", config.bind_address))?
    .run()
    .await?;

    Ok(())
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    // A missing .env is fine; the environment may already be set.
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
