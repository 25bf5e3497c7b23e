use crate::config::model::Config;

pub fn load_config() -> Result<Config, anyhow::Error> {
    load_config_from_path("fulcrum.toml")
}

pub fn load_config_from_path(config_path: &str) -> Result<Config, anyhow::Error> {
    let config_str = std::fs::read_to_string(config_path)?;
    load_config_from_str(&config_str)
}

pub fn load_config_from_str(config_str: &str) -> Result<Config, anyhow::Error> {
    let config: Config = toml::from_str(config_str)?;
    config.validate()?;
    Ok(config)
}
