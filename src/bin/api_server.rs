// HTTP API server binary exposing the populate action

use anyhow::Result;
use gog_populate::api::ApiServer;
use gog_populate::util::env as env_util;
use gog_populate::util::logging::{init_tracing, DEFAULT_FILTER};
use gog_populate::{PopulateConfig, PopulateService};

#[actix_web::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    tracing::info!("Initializing populate API server");
    env_util::preflight_check("api_server", &[], PopulateConfig::LOGGED_KEYS)?;

    let server = ApiServer::from_env()?;
    let service = PopulateService::from_config(PopulateConfig::from_env())?;

    server.run(service).await?;

    Ok(())
}
