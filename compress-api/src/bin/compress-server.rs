//! Compression API Warp Service Binary.

use std::net::ToSocketAddrs;
use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing::info;
use warp::Filter;

use compress_api::api;
use compress_api::config::Settings;
use compress_api::context::ApiContext;
use compress_api::logging::{self, LogFormat};

/// Command line arguments for the local compression server.
#[derive(Debug, Parser)]
#[clap(name = "Compression API server")]
struct ServerArgs {
    /// Optional path to a configuration file. Values not set there come from
    /// the embedded defaults and `COMPRESS_API_*` environment variables.
    #[clap(short = 'c', long, env = "COMPRESS_API_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `logging.format` from the configuration.
    #[clap(short = 'o', long = "output-format")]
    output_format: Option<LogFormat>,

    /// Print the OpenAPI document and exit.
    #[clap(long)]
    openapi: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();

    if args.openapi {
        println!("{}", api::ApiDoc::to_pretty_json()?);
        return Ok(());
    }

    let settings = Settings::new(args.config.as_ref())?;
    let format = args.output_format.unwrap_or(settings.logging.format);
    logging::setup_logging(&settings.logging.directives, format);

    let addr_str = format!("{}:{}", settings.server.host, settings.server.port);
    let context = ApiContext::from_settings(settings)?;
    info!(backend = ?context.settings.compression.backend, "compression context setup for local server");

    let routes = api::routes::routes(context).with(warp::log("api"));

    info!("Server will run locally on {}", addr_str);
    let addr = match addr_str.to_socket_addrs() {
        Ok(mut addrs) => addrs.next().ok_or("No addresses found")?,
        Err(e) => {
            error!("Failed to resolve address: {}", e);
            return Err(e.into());
        }
    };

    warp::serve(routes).run(addr).await;
    Ok(())
}
