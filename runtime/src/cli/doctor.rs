//! Environment readiness check.

use super::{output, setup};
use crate::config::{DetailSourceKind, HarvestConfig};
use crate::renderer::chromium::find_chromium;
use crate::store::tables;
use anyhow::Result;

/// Check Chromium availability, configuration and store reachability.
pub async fn run(config: &HarvestConfig) -> Result<()> {
    let chromium = find_chromium();
    let validation = config.validate();
    let store = match setup::open_store(config) {
        Ok(Some(store)) => Some(
            store
                .query(tables::BOXES, &[], Some(1))
                .await
                .map(|_| store.kind())
                .map_err(|e| e.to_string()),
        ),
        Ok(None) => None,
        Err(e) => Some(Err(format!("{e:#}"))),
    };
    let token = config.site.api_token.is_some();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "config_valid": validation.is_ok(),
            "config_error": validation.as_ref().err().map(|e| e.to_string()),
            "store": match &store {
                Some(Ok(kind)) => serde_json::json!({ "ok": true, "kind": kind }),
                Some(Err(e)) => serde_json::json!({ "ok": false, "error": e }),
                None => serde_json::Value::Null,
            },
            "api_token": token,
        }));
        return Ok(());
    }

    println!("Case Harvest Doctor");
    println!("===================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set CASE_HARVEST_CHROMIUM_PATH."
        ),
    }
    match &validation {
        Ok(()) => println!("[OK] Configuration valid"),
        Err(e) => println!("[!!] Configuration invalid: {e}"),
    }
    match &store {
        Some(Ok(kind)) => println!("[OK] Store reachable ({kind})"),
        Some(Err(e)) => println!("[!!] Store unreachable: {e}"),
        None => println!("[??] No store configured"),
    }
    if config.site.detail_source == DetailSourceKind::Api {
        if token {
            println!("[OK] API token configured ({} header)", config.site.token_header);
        } else {
            println!("[!!] No API token; set CASE_HARVEST_API_TOKEN for the detail endpoint");
        }
    }

    println!();
    let ready = chromium.is_some() && validation.is_ok() && !matches!(store, Some(Err(_)));
    println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    Ok(())
}
