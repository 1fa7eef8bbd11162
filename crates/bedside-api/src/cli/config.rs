//! `bedside config`: show the effective configuration.

use std::path::Path;

use bedside_infra::config::render_config;
use bedside_types::config::BedsideConfig;

pub fn print_config(config: &BedsideConfig, path: &Path, quiet: bool) -> anyhow::Result<()> {
    let rendered = render_config(config)?;
    if !quiet {
        let exists = path.exists();
        eprintln!(
            "  {} {} {}",
            console::style("#").dim(),
            console::style(path.display()).cyan(),
            if exists {
                console::style("(loaded)").green()
            } else {
                console::style("(not found, defaults)").yellow()
            }
        );
    }
    print!("{rendered}");
    Ok(())
}
