//! `nimbus tools`: list what the weather server offers.

use anyhow::Result;
use clap::Args;

use nimbus_agent::{McpToolAdapter, Tool, ToolRegistry};

use super::{Context, disconnect};

/// Arguments for `nimbus tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Show full input schemas
    #[arg(long)]
    pub full: bool,
}

/// Run `nimbus tools`.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let session = ctx.connect().await?;
    let adapters = McpToolAdapter::from_session(&session).await;

    let outcome = match adapters {
        Ok(adapters) => print_tools(adapters, &args, ctx),
        Err(e) => Err(e.into()),
    };

    disconnect(&session).await;
    outcome
}

fn print_tools(adapters: Vec<McpToolAdapter>, args: &ToolsArgs, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let mut registry = ToolRegistry::new();
        for adapter in adapters {
            registry.register(adapter);
        }
        println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
        return Ok(());
    }

    if adapters.is_empty() {
        println!("The server offers no tools.");
        return Ok(());
    }

    for adapter in &adapters {
        println!("{}", adapter.tool_name());
        println!("  {}", adapter.description());
        println!("  input: {}", adapter.query_field());
        if ctx.verbose {
            println!("  qualified: {}", adapter.name());
        }
        if args.full {
            println!(
                "  schema: {}",
                serde_json::to_string_pretty(&adapter.parameters())?
            );
        }
    }

    Ok(())
}
