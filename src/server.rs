use std::io::Write;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;

use crate::classifier::{ModelManifest, TractClassifier};
use crate::config::Config;
use crate::handlers::{self, AppState};
use crate::labels::LabelSource;

/// Registers `/`, `/static/script.js` and `/predict`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(handlers::index)))
        .service(web::resource("/static/script.js").route(web::get().to(handlers::script)))
        .service(web::resource("/predict").route(web::post().to(handlers::predict)));
}

pub fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_env("RUST_LOG")
        .init();
}

pub async fn startup(config: Config) -> anyhow::Result<()> {
    let manifest = ModelManifest::resolve(config.manifest.as_deref(), &config.model_path)?;
    let classifier = TractClassifier::load(&config.model_path, manifest)?;

    let state = web::Data::new(AppState::new(
        Arc::new(classifier),
        LabelSource::new(&config.class_names),
        config.max_upload_bytes,
    ));

    log::info!("Server running at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    Ok(())
}
