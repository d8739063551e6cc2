//! Ask command - one investigation, run in-process.

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::Style;
use freightscope_investigate::{
    InvestigationMode, InvestigationRequest, InvestigationResult, StepKind, Termination,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use super::Context;
use super::setup::{self, Overrides};

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to investigate
    #[arg(required = true)]
    pub question: String,

    /// Customer whose shipments are investigated
    #[arg(short, long, env = "FREIGHTSCOPE_CUSTOMER")]
    pub customer: String,

    /// Force an investigation mode: quick, visual, deep
    #[arg(short, long)]
    pub mode: Option<InvestigationMode>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Run the ask command.
///
/// Ctrl-C cancels the investigation; whatever was found so far is printed.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?.config;
    args.overrides.apply(&mut config)?;
    let investigator = setup::build_investigator(&config)?;

    let mut request = InvestigationRequest::new(args.question, args.customer);
    if let Some(mode) = args.mode {
        request = request.with_mode(mode);
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let spinner = (!ctx.json_output).then(spinner);
    let result = investigator.investigate_with_cancel(request, cancel).await;
    watcher.abort();
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let result = result?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render(&result, ctx.verbose));
    }
    Ok(())
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
        .template("{spinner} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message("Investigating...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Human-readable rendering of a result.
fn render(result: &InvestigationResult, verbose: bool) -> String {
    let dim = Style::new().dim();
    let bold = Style::new().bold();
    let yellow = Style::new().yellow();
    let mut out = String::new();

    if verbose {
        for step in &result.reasoning {
            let label = match (step.kind, step.tool_name.as_deref()) {
                (StepKind::Routing, _) => "routing".to_string(),
                (StepKind::Thinking, _) => "thinking".to_string(),
                (StepKind::ToolCall, Some(tool)) => format!("call {}", tool),
                (StepKind::ToolResult, Some(tool)) => format!("result {}", tool),
                (_, None) => "tool".to_string(),
            };
            let _ = writeln!(out, "{}", dim.apply_to(format!("[{}] {}", label, step.content)));
        }
        if !result.reasoning.is_empty() {
            out.push('\n');
        }
    }

    let _ = writeln!(out, "{}", result.answer);

    if !result.visualizations.is_empty() {
        let _ = writeln!(out, "\n{}", bold.apply_to("Visualizations:"));
        for viz in &result.visualizations {
            let _ = writeln!(
                out,
                "  • {} {} ({} {})",
                dim.apply_to(format!("{:?}", viz.kind()).to_lowercase()),
                viz.title,
                viz.chart.len(),
                if viz.chart.len() == 1 { "entry" } else { "entries" }
            );
        }
    }

    if !result.follow_up_questions.is_empty() {
        let _ = writeln!(out, "\n{}", bold.apply_to("Follow-up questions:"));
        for (i, follow_up) in result.follow_up_questions.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, follow_up.question);
        }
    }

    let meta = &result.metadata;
    if meta.termination != Termination::Completed {
        let detail = meta
            .backend_error
            .as_deref()
            .map(|e| format!(": {}", e))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "\n{}",
            yellow.apply_to(format!("Stopped early ({}){}", meta.termination.as_str(), detail))
        );
    }

    let _ = writeln!(
        out,
        "\n{}",
        dim.apply_to(format!(
            "{} mode · {} tool call{} · {} turn{} · {} ms",
            meta.mode,
            meta.tool_call_count,
            if meta.tool_call_count == 1 { "" } else { "s" },
            meta.iterations,
            if meta.iterations == 1 { "" } else { "s" },
            meta.processing_time_ms
        ))
    );
    out
}
