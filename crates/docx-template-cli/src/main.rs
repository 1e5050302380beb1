mod config;

use std::fs;
use std::io::{self, Read};

use anyhow::{bail, Context};
use clap::Parser;
use docx_template::DocxTemplate;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;

fn read_data(source: &str) -> anyhow::Result<serde_json::Value> {
    let text = if source == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read data from stdin")?;
        text
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read data file {source}"))?
    };
    let data: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {source}"))?;
    if !data.is_object() {
        bail!("Data in {source} must be a JSON object");
    }
    Ok(data)
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!("Rendering {}", config.template.display());
    info!("  Data: {}", config.data);
    info!("  Output: {}", config.output.display());

    let data = read_data(&config.data)?;
    let mut doc = DocxTemplate::open(&config.template)
        .with_context(|| format!("Failed to open template {}", config.template.display()))?
        .with_options(config.render_options());

    doc.render(&data)
        .with_context(|| format!("Failed to render {}", config.template.display()))?;
    doc.save(&config.output)
        .with_context(|| format!("Failed to write {}", config.output.display()))?;

    info!("Done");
    Ok(())
}
