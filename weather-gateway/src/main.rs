//! Binary crate for the `weather-gateway` HTTP service.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and loading configuration
//! - Routing HTTP requests to the Open-Meteo client in `weather-core`
//! - Mapping failures onto HTTP status codes

use clap::Parser;

mod cli;
mod error;
mod routes;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
