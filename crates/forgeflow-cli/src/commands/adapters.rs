//! `forgeflow adapters`: list the supported assistant CLI types.

use anyhow::Result;

use forgeflow_pilot::adapters::{list_supported, DEFAULT_CLI_TYPE};

/// Run the `forgeflow adapters` command.
pub fn run() -> Result<()> {
    for key in list_supported() {
        if *key == DEFAULT_CLI_TYPE {
            println!("{key} (default)");
        } else {
            println!("{key}");
        }
    }
    Ok(())
}
