//! `nimbus serve`: the weather server on stdin/stdout.

use anyhow::Result;
use clap::Args;

use nimbus_mcp::{Framing, McpTransport};
use nimbus_weather::weather_server;

use super::Context;

/// Arguments for `nimbus serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the configured framing
    #[arg(long, value_parser = parse_framing)]
    pub framing: Option<Framing>,
}

fn parse_framing(value: &str) -> std::result::Result<Framing, String> {
    match value {
        "newline" | "newline-delimited" => Ok(Framing::NewlineDelimited),
        "content-length" => Ok(Framing::ContentLength),
        other => Err(format!(
            "unknown framing '{other}' (expected 'newline' or 'content-length')"
        )),
    }
}

/// Run `nimbus serve`.
///
/// Returns when the client closes stdin.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;
    let framing = args.framing.unwrap_or(config.session().framing);
    let weather = config.weather_config()?;

    tracing::info!(
        base_url = %weather.base_url,
        timeout_secs = weather.timeout.as_secs(),
        ?framing,
        "starting weather server on stdio"
    );

    weather_server(weather)?
        .serve(McpTransport::stdio(framing))
        .await?;

    tracing::info!("weather server stopped");
    Ok(())
}
