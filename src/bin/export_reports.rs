use std::path::PathBuf;

use anyhow::{Context, Result};

use coach_portal::config::PortalConfig;
use coach_portal::export::{export_reports_with_progress, load_export_players};

const DEFAULT_OUT: &str = "report_cards.xlsx";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = PortalConfig::from_env();
    let store = config.open_store().context("open data store")?;
    let team = parse_arg("--team");
    let players = load_export_players(store.as_ref(), team.as_deref())?;
    if players.is_empty() {
        eprintln!("[WARN] No players to export");
    }

    let out = parse_arg("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));
    let report = export_reports_with_progress(&out, &players, |progress| {
        println!("[{}/{}] {}", progress.current, progress.total, progress.message);
    })?;

    println!("Export complete");
    println!("File: {}", out.display());
    println!("Players: {}", report.players);
    println!("Reports: {}", report.reports);
    println!("Stat rows: {}", report.stats);
    println!("Targets: {}", report.targets);
    Ok(())
}

fn parse_arg(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
