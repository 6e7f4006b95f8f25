//! `nimbus config`: show the effective configuration.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for `nimbus config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print only the user config file path
    #[arg(long)]
    pub path: bool,
}

/// Run `nimbus config`.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    if args.path {
        match nimbus_config::xdg_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no config directory on this platform"),
        }
        return Ok(());
    }

    let loaded = &ctx.loaded;
    let effective = loaded.config.effective();

    if ctx.json_output {
        let sources: Vec<_> = loaded
            .sources
            .iter()
            .map(|s| {
                serde_json::json!({
                    "path": s.path.display().to_string(),
                    "loaded": s.loaded,
                })
            })
            .collect();
        let output = serde_json::json!({
            "config": effective,
            "sources": sources,
            "warnings": loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for source in &loaded.sources {
        let marker = if source.loaded { "loaded" } else { "not found" };
        println!("# {} ({})", source.path.display(), marker);
    }
    for warning in &loaded.warnings {
        println!("# warning: {}", warning);
    }
    println!();
    print!("{}", effective.to_toml()?);

    Ok(())
}
