use clap::Parser;
use image_classifier::{server, Config};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    server::init_logging(config.log_level);
    server::startup(config).await
}
