mod commandline;
mod defaults;
mod file;
mod primitives;

use std::path::Path;

use clap::Parser;
use commandline::{Args, ConfigFormat, Output};
use config::Environment;
use defaults::Defaults;

pub(crate) use file::{ConfigFile as Configuration, OpenTelemetry, Repo, Sled, Store, Tracing};
pub(crate) use primitives::LogFormat;

pub(crate) fn configure() -> color_eyre::Result<Configuration> {
    let Output {
        config_format,
        save_to,
        config_file,
    } = Args::parse().into_output();

    build_inner(config_format, config_file, save_to)
}

pub(crate) fn configure_without_clap<P, Q>(
    config_file: Option<P>,
    save_to: Option<Q>,
) -> color_eyre::Result<Configuration>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    build_inner(ConfigFormat::default(), config_file, save_to)
}

fn build_inner<P, Q>(
    args: ConfigFormat,
    config_file: Option<P>,
    save_to: Option<Q>,
) -> color_eyre::Result<Configuration>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let base_config = config::Config::builder()
        .add_source(config::Config::try_from(&Defaults::default())?);

    let base_config = if let Some(config_file) = config_file {
        base_config.add_source(config::File::from(config_file.as_ref()))
    } else {
        base_config
    };

    let config: Configuration = base_config
        .add_source(Environment::with_prefix("REELHOST").separator("__"))
        .add_source(config::Config::try_from(&args)?)
        .build()?
        .try_deserialize()?;

    if let Some(save_to) = save_to {
        let output = toml::to_string_pretty(&config)?;
        std::fs::write(save_to, output)?;
    }

    Ok(config)
}
