use anyhow::{bail, Result};
use std::path::Path;

use crate::config::DocwardenConfig;

const CONFIG_PATH: &str = "docwarden.toml";

pub async fn run(force: bool) -> Result<()> {
    if Path::new(CONFIG_PATH).exists() && !force {
        bail!("{CONFIG_PATH} already exists; use --force to overwrite");
    }
    DocwardenConfig::default().save_to_file(CONFIG_PATH)?;
    println!("Wrote default configuration to {CONFIG_PATH}");
    Ok(())
}
