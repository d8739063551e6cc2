//! Serve command - runs the HTTP API.

use anyhow::Result;
use clap::Args;
use console::Style;
use freightscope_server::Server;

use super::Context;
use super::setup::{self, Overrides};

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to, e.g. 0.0.0.0:8080 (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?.config;
    args.overrides.apply(&mut config)?;

    let mut server_config = config.server();
    if let Some(bind) = args.bind {
        server_config.bind = bind;
    }

    let investigator = setup::build_investigator(&config)?;
    let server = Server::new(investigator, server_config);
    let addr = server.bind_address()?;

    if !ctx.json_output {
        let dim = Style::new().dim();
        println!("freightscope listening on http://{}", addr);
        println!("{}", dim.apply_to("Press Ctrl-C to stop"));
    }

    server.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
