use anyhow::Result;
use qos_config::{GlobalConfig, paths};

pub(crate) fn handle_config_show() -> Result<()> {
    let config = GlobalConfig::load()?;
    match paths::config_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# (no config directory)"),
    }
    println!("# state_dir = {}", paths::state_dir().display());
    print!("{}", config.to_effective_toml()?);
    Ok(())
}

pub(crate) fn handle_config_init() -> Result<()> {
    let path = GlobalConfig::save_default_template()?;
    eprintln!("Generated config template at: {}", path.display());
    Ok(())
}
