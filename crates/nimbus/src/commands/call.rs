//! `nimbus call`: one weather lookup through a fresh session.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::Value;

use nimbus_agent::{
    CancellationToken, McpToolAdapter, Tool, ToolContext, ToolRegistry, ToolResult,
};
use nimbus_weather::TOOL_NAME;

use super::{Context, disconnect};

/// Arguments for `nimbus call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Free-text city query, e.g. "Santa Clara, CA"
    pub query: String,

    /// Tool to call
    #[arg(long, default_value = TOOL_NAME)]
    pub tool: String,
}

/// Run `nimbus call`.
///
/// A tool-level error is reported on stderr and fails the command.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let session = ctx.connect().await?;
    let outcome = call_tool(&session, &args).await;
    disconnect(&session).await;

    match outcome? {
        ToolResult::Error { message, .. } => bail!("{}: {}", args.tool, message),
        result => {
            println!("{}", render(&result, ctx.json_output));
            Ok(())
        }
    }
}

async fn call_tool(
    session: &std::sync::Arc<nimbus_mcp::McpSession>,
    args: &CallArgs,
) -> Result<ToolResult> {
    let adapter = McpToolAdapter::from_session(session)
        .await?
        .into_iter()
        .find(|adapter| adapter.matches_name(&args.tool));
    let Some(adapter) = adapter else {
        bail!("server '{}' has no tool '{}'", session.name(), args.tool);
    };

    let name = adapter.name().to_string();
    let mut registry = ToolRegistry::new();
    registry.register(adapter);

    let cancel = CancellationToken::new();
    let ctx = ToolContext::with_cancellation(cancel.clone());
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let result = registry
        .execute(&name, Value::String(args.query.clone()), &ctx)
        .await;
    interrupt.abort();

    Ok(result?)
}

/// Text to print for a successful result.
fn render(result: &ToolResult, json: bool) -> String {
    let content = result.to_content();
    if json {
        return content;
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(report) if report.get("temperature").is_some() => summarize(&report),
        _ => content,
    }
}

fn summarize(report: &Value) -> String {
    let field = |name: &str| report.get(name).cloned().unwrap_or(Value::Null);
    let degrees = |name: &str, unit: &str| {
        report
            .get(name)
            .and_then(|t| t.get(unit))
            .and_then(Value::as_f64)
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "?".to_string())
    };

    format!(
        "{city}: {condition}\n  temperature  {c} °C / {f} °F\n  feels like   {fc} °C / {ff} °F\n  humidity     {humidity}%\n  wind         {wind} m/s\n  visibility   {vis} km\n  as of        {ts}",
        city = field("city").as_str().unwrap_or_default(),
        condition = field("condition").as_str().unwrap_or_default(),
        c = degrees("temperature", "celsius"),
        f = degrees("temperature", "fahrenheit"),
        fc = degrees("feels_like", "celsius"),
        ff = degrees("feels_like", "fahrenheit"),
        humidity = field("humidity"),
        wind = field("wind_speed_ms"),
        vis = field("visibility_km"),
        ts = field("timestamp").as_str().unwrap_or_default(),
    )
}
