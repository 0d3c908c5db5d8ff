//! Output mode shared by all subcommands.

use crate::harvest::RunReport;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Default)]
struct Mode {
    json: bool,
    quiet: bool,
}

static MODE: OnceLock<Mode> = OnceLock::new();

/// Set once at startup from the global flags.
pub fn init(json: bool, quiet: bool) {
    let _ = MODE.set(Mode { json, quiet });
}

fn mode() -> Mode {
    MODE.get().copied().unwrap_or_default()
}

pub fn is_json() -> bool {
    mode().json
}

pub fn is_quiet() -> bool {
    mode().quiet
}

pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: failed to render JSON: {e}"),
    }
}

/// Print one run report, as JSON or as a short summary.
pub fn print_report(report: &RunReport) {
    if is_json() {
        match serde_json::to_value(report) {
            Ok(value) => print_json(&value),
            Err(e) => eprintln!("  Error: failed to render report: {e}"),
        }
        return;
    }
    if is_quiet() {
        return;
    }

    let status = if report.success { "OK" } else { "FAILED" };
    println!(
        "[{status}] {} ({}) processed {}, failed {}, {}ms",
        report.harvester,
        report.run_id,
        report.processed,
        report.failed,
        report.elapsed_ms()
    );
    if let Some(error) = &report.error {
        println!("  error: {error}");
    }
    for outcome in &report.outcomes {
        let mark = if outcome.success { "ok" } else { "!!" };
        let mut line = format!(
            "  [{mark}] parent {}: {} raw, {} skins, {} melee",
            outcome.parent_id, outcome.raw_items, outcome.skins, outcome.melee
        );
        if let Some(stats) = &outcome.persist {
            line.push_str(&format!(
                ", links {}+{}, failed {}",
                stats.skin_links, stats.melee_links, stats.failed
            ));
        }
        if let Some(error) = &outcome.error {
            line.push_str(&format!(" ({error})"));
        }
        println!("{line}");
    }
}
