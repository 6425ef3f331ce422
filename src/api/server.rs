// API server implementation using actix-web

use crate::api::{auth, handlers::ApiState, middleware, routes};
use crate::populate::PopulateService;
use crate::util::env::{env_opt, env_parse};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub api_secret: Option<String>,
    pub allowed_origins: String,
    /// 0 keeps actix's default of one worker per core.
    pub workers: usize,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match env_opt("API_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid API_PORT: {raw}"))?,
            None => 8080,
        };
        let api_secret = env_opt("API_SECRET");
        if api_secret.is_none() {
            tracing::warn!("API_SECRET not set; populate endpoint is unauthenticated");
        }
        let allowed_origins = env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:1337".to_string());
        let workers: usize = env_parse("API_WORKERS", 0usize);

        Ok(Self {
            host,
            port,
            api_secret,
            allowed_origins,
            workers,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, service: PopulateService) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            auth = self.api_secret.is_some(),
            "Starting populate API server"
        );

        let state = web::Data::new(ApiState::new(service));
        let api_secret = self.api_secret.clone();
        let allowed_origins = self.allowed_origins.clone();

        let mut server = HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);
            let auth = auth::Auth::new(api_secret.clone());

            App::new()
                .app_data(state.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .wrap(auth)
                .configure(routes::configure_routes)
        });
        if self.workers > 0 {
            server = server.workers(self.workers);
        }

        server
            .bind(&bind_addr)
            .with_context(|| format!("Failed to bind to {}", bind_addr))?
            .run()
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}
