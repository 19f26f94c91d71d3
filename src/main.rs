use anyhow::Result;
use domain_recon::api::start_server;
use domain_recon::config::Config;
use domain_recon::utils::logger::init_logger;

#[actix_web::main]
async fn main() -> Result<()> {
    init_logger()?;

    let config = Config::from_env();
    start_server(config).await
}
