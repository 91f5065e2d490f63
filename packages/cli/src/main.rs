#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Interactive CLI for the covid map toolchain.
//!
//! Lets users start the mirror proxy, inspect a derived dataset, or play
//! one back date by date in the terminal.
//!
//! Uses `indicatif-log-bridge` (via [`progress::init_logger`]) to route
//! `log` output through `indicatif::MultiProgress` so that log lines and
//! progress bars never fight for the terminal.

mod explore;
mod progress;

use dialoguer::Select;

/// Top-level tool selection.
enum Tool {
    Proxy,
    Inspect,
    Play,
}

impl Tool {
    const ALL: &[Self] = &[Self::Proxy, Self::Inspect, Self::Play];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Proxy => "Start mirror proxy",
            Self::Inspect => "Inspect a dataset",
            Self::Play => "Play a dataset",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();

    println!("COVID Map Toolchain");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::Proxy => {
            // The proxy uses actix-web's runtime, so run it on a blocking
            // thread to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(|| {
                actix_web::rt::System::new().block_on(covid_map_proxy::interactive::run())
            })
            .await??;
        }
        Tool::Inspect => explore::inspect(&multi).await?,
        Tool::Play => explore::play(&multi).await?,
    }

    Ok(())
}
