//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration and which files it came from
    Show,

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("# freightscope configuration\n");

    println!("Config file search order (later overrides earlier):");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }
    println!();

    let llm = config.llm();
    let key_status = match freightscope_config::resolve_llm_api_key(&llm) {
        Ok(Some(secret)) => format!("key from {}", secret.source),
        Ok(None) => "no key needed".to_string(),
        Err(_) => "✗ no API key".to_string(),
    };
    println!("Backend: {} / {}  ({})", llm.effective_backend(), llm.effective_model(), key_status);

    let store = config.store();
    match store.dataset_path {
        Some(ref path) if store.effective_kind() == freightscope_config::StoreKind::Dataset => {
            println!("Store:   dataset {}", path.display());
        }
        _ => println!(
            "Store:   http {}",
            store.base_url.as_deref().unwrap_or("(base_url not set)")
        ),
    }
    println!("Server:  {}", config.server().bind);
    println!();

    let mut effective = config.clone();
    effective.server = Some(config.server());
    effective.investigation = Some(config.investigation());
    println!("---\nEffective settings:\n");
    println!("{}", effective.to_toml()?);

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let path = match ctx.config_dir {
        Some(ref dir) => Some(dir.join("config.toml")),
        None => freightscope_config::user_config_path(),
    };
    match path {
        Some(path) => println!("{}", path.display()),
        None => println!("(no config directory available on this platform)"),
    }
    Ok(())
}
