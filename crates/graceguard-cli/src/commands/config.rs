use std::path::PathBuf;

use anyhow::{Context, Result};

use graceguard_core::config::{Config, ConfigPaths};

pub fn print_effective(config_path: Option<PathBuf>) -> Result<()> {
    let paths = ConfigPaths::resolve()?;
    let config = match config_path {
        Some(path) => {
            Config::load(&path).with_context(|| format!("load config {}", path.display()))?
        }
        None => Config::load_or_default(None, &paths)?,
    };
    let output = config.to_toml_string()?;
    println!("{}", output);
    Ok(())
}

pub fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let paths = ConfigPaths::resolve()?;
    let config_path = path.unwrap_or(paths.config_path);
    if config_path.exists() && !force {
        return Err(anyhow::anyhow!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    let config = Config::default_config();
    config.save(&config_path)?;
    println!("Config written to {}", config_path.display());
    Ok(())
}
