#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Mirror proxy entry point.

use std::path::PathBuf;

use clap::Parser;
use covid_map_proxy::config::CONFIG_PATH_ENV;
use covid_map_proxy::{load_config, run_server};

#[derive(Parser)]
#[command(
    name = "covid_map_proxy",
    about = "Caching mirror for the county case, death, and population CSVs"
)]
struct Cli {
    /// TOML config file (overrides `COVID_MAP_PROXY_CONFIG`)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let cli = Cli::parse();
    let path = cli
        .config
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config = load_config(path.as_deref())?;

    run_server(config).await?;
    Ok(())
}
