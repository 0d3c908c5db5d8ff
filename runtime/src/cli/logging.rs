//! Process-wide tracing setup. Logs go to stderr so stdout stays parseable.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber: `RUST_LOG` plus a default level for our crates.
pub fn init(json: bool, verbose: bool, quiet: bool) -> Result<()> {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("case_harvest={level}").parse()?)
        .add_directive(format!("case_catalog={level}").parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
