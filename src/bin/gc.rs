use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use gog_populate::cms::InMemoryCms;
use gog_populate::normalization::slugify;
use gog_populate::storefront::GogClient;
use gog_populate::util::env;
use gog_populate::util::logging::{init_tracing, DEFAULT_FILTER};
use gog_populate::{PopulateConfig, PopulateService};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gc", version, about = "GOG to CMS populate CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch one storefront listing page and create the games missing from the CMS
    Populate {
        /// Listing page (default 1)
        #[arg(long)]
        page: Option<u32>,
        /// Listing sort order (default popularity)
        #[arg(long)]
        sort: Option<String>,
        /// Extra listing query parameter, `key=value`; repeatable
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Override LISTING_LIMIT for this run (at most 50)
        #[arg(long)]
        limit: Option<usize>,
        /// Write into an in-memory CMS instead of the configured one
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Print the run summary as JSON on stdout
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Retry every image upload recorded in a failure log, once
    ReplayFailures {
        /// Failure log path (defaults to FAILURE_LOG)
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Print the slug the CMS would receive for a name
    Slug { name: String },
}

fn parse_key_val(raw: &str) -> Result<(String, String)> {
    let (k, v) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got `{raw}`"))?;
    let k = k.trim();
    if k.is_empty() {
        bail!("empty key in `{raw}`");
    }
    Ok((k.to_string(), v.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Populate {
            page,
            sort,
            params,
            limit,
            dry_run,
            json,
        } => {
            env::preflight_check("gc populate", &[], PopulateConfig::LOGGED_KEYS)?;
            let mut cfg = PopulateConfig::from_env();
            if let Some(limit) = limit {
                cfg = PopulateConfig {
                    listing_limit: limit,
                    ..cfg
                }
                .capped();
            }

            let service = if dry_run {
                warn!("dry run: games go to an in-memory CMS and are discarded");
                cfg.failure_log = None;
                let storefront = GogClient::new(&cfg.gog_base_url, cfg.http_timeout)?;
                PopulateService::new(cfg, Arc::new(storefront), Arc::new(InMemoryCms::new()))
            } else {
                PopulateService::from_config(cfg)?
            };

            let mut overrides = params;
            if let Some(page) = page {
                overrides.push(("page".to_string(), page.to_string()));
            }
            if let Some(sort) = sort {
                overrides.push(("sort".to_string(), sort));
            }

            let summary = service.populate(overrides).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            for failure in &summary.failed {
                warn!(title = %failure.title, kind = ?failure.kind, error = %failure.error, "game not created");
            }
            info!(created = summary.created.len(), "Finished populating!");
        }
        Commands::ReplayFailures { log } => {
            let cfg = PopulateConfig::from_env();
            let path = log
                .or_else(|| cfg.failure_log.clone())
                .context("no failure log: pass --log or set FAILURE_LOG")?;
            let service = PopulateService::from_config(cfg)?;
            let report = service.replay_failure_log(&path).await?;
            info!(
                attempted = report.attempted,
                recovered = report.recovered,
                still_failing = report.still_failing.len(),
                "replay-failures: completed"
            );
        }
        Commands::Slug { name } => {
            println!("{}", slugify(&name));
        }
    }

    Ok(())
}
