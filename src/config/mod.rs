mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, ClientSettings, DisconnectPolicy, PartialSettings, ServerSettings, Settings,
};

/// Loads `config/default.*` (if present) and `MOM_*` environment variables,
/// e.g. `MOM_BROKER__LOG_DIR`, and merges them over the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("MOM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge(Settings::default()))
}
