//! `info` - what the daemon supports and how its bridges are managed

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use super::converge::{connect, load_config};
use crate::Context;
use crate::config::SlingConfig;
use crate::lxd::{BridgeGeneration, RunContext};
use crate::ui;

/// API extensions that change how entities converge
const RELEVANT_EXTENSIONS: &[&str] = &["network", "storage", "storage_driver_ceph"];

#[derive(Debug, Serialize)]
struct InfoReport {
    server_path: String,
    reachable: bool,
    server_version: Option<String>,
    api_version: Option<String>,
    bridge_generation: BridgeGeneration,
    extensions: Vec<(String, bool)>,
    host_addresses: Vec<String>,
}

impl InfoReport {
    fn gather(config: &SlingConfig, run: &RunContext) -> Self {
        let info = run.info();
        Self {
            server_path: config.server_path.clone(),
            reachable: info.is_some(),
            server_version: info.and_then(|i| i.server_version()).map(String::from),
            api_version: info.and_then(|i| i.api_version.clone()),
            bridge_generation: run.generation(),
            extensions: RELEVANT_EXTENSIONS
                .iter()
                .map(|ext| ((*ext).to_string(), run.has_extension(ext)))
                .collect(),
            host_addresses: run.host_addrs().iter().map(ToString::to_string).collect(),
        }
    }
}

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let config = match &ctx.config {
        Some(_) => load_config(ctx)?.0,
        None => SlingConfig::load_or_default(&crate::paths::config_file()?)?,
    };
    let run = connect(&config)?;
    let report = InfoReport::gather(&config, &run);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    ui::header("LXD Info");
    ui::kv("Server", &report.server_path);
    match &report.server_version {
        Some(version) => ui::kv("Version", version),
        None if !report.reachable => ui::kv("Version", &"unreachable".red().to_string()),
        None => ui::kv("Version", "unknown"),
    }
    ui::kv("Bridges", &report.bridge_generation.to_string());

    ui::section("Extensions");
    for (name, present) in &report.extensions {
        println!("  {} {}", ui::mark(*present), name);
    }

    if !ctx.quiet && !report.host_addresses.is_empty() {
        ui::section("Host addresses");
        for addr in &report.host_addresses {
            ui::dim(addr);
        }
    }
    Ok(())
}
