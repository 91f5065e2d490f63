//! Interactive mode for the proxy.
//!
//! Prompts the user for bind address and port before starting the server.

use std::path::PathBuf;

use dialoguer::{Confirm, Input};

use crate::config::CONFIG_PATH_ENV;

/// Runs the proxy in interactive mode, prompting for configuration.
///
/// Loads the configuration as the binary does, lets the user adjust the
/// bind address and port, and delegates to [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration cannot be
/// loaded or the underlying server fails to start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("COVID Map Mirror Proxy");
    println!();

    let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let mut config = super::load_config(path.as_deref()).map_err(std::io::Error::other)?;

    config.bind_addr = Input::new()
        .with_prompt("Bind address")
        .default(config.bind_addr.clone())
        .interact_text()
        .unwrap_or_else(|_| config.bind_addr.clone());

    config.port = Input::new()
        .with_prompt("Port")
        .default(config.port)
        .interact_text()
        .unwrap_or(config.port);

    if !Confirm::new()
        .with_prompt(format!("Start proxy on {}?", config.socket_addr()))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    super::run_server(config).await
}
