//! Tools command - inspect the tool catalog.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use freightscope_investigate::{TOOL_CATALOG_VERSION, tool_catalog, tool_definition};
use serde_json::json;

use super::Context;

/// Arguments for the tools command.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Show one tool in full, including its input schema
    pub name: Option<String>,
}

/// Run the tools command.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    if let Some(name) = args.name {
        let Some(tool) = tool_definition(&name) else {
            bail!("Unknown tool: '{}'. Run 'freightscope tools' for the list", name);
        };
        if ctx.json_output {
            println!("{}", serde_json::to_string_pretty(tool)?);
        } else {
            let bold = Style::new().bold();
            println!("{}\n", bold.apply_to(&tool.name));
            println!("{}\n", tool.description);
            println!("Input schema:");
            println!("{}", serde_json::to_string_pretty(&tool.input_schema)?);
        }
        return Ok(());
    }

    let catalog = tool_catalog();
    if ctx.json_output {
        let body = json!({ "version": TOOL_CATALOG_VERSION, "tools": catalog });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!(
        "Tool catalog {} ({} tools)\n",
        TOOL_CATALOG_VERSION,
        catalog.len()
    );
    for tool in catalog {
        println!("  {:<26} {}", tool.name, dim.apply_to(summary(&tool.description)));
    }
    Ok(())
}

/// First sentence of a description.
fn summary(description: &str) -> &str {
    match description.find(". ") {
        Some(end) => &description[..=end],
        None => description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_takes_first_sentence() {
        assert_eq!(summary("Counts things. Use for totals."), "Counts things.");
        assert_eq!(summary("No period here"), "No period here");
    }

    #[test]
    fn test_every_tool_has_a_summary() {
        assert!(tool_catalog().iter().all(|t| !summary(&t.description).is_empty()));
    }
}
