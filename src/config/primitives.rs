use clap::ValueEnum;
use std::{fmt::Display, str::FromStr};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Deserialize,
    serde::Serialize,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub(crate) enum LogFormat {
    Compact,
    Json,
    Normal,
    Pretty,
}

#[derive(Clone, Debug)]
pub(crate) struct Targets {
    pub(crate) targets: tracing_subscriber::filter::Targets,
}

impl FromStr for Targets {
    type Err = <tracing_subscriber::filter::Targets as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Targets {
            targets: s.parse()?,
        })
    }
}

impl Display for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets = self
            .targets
            .iter()
            .map(|(path, level)| format!("{path}={level}"))
            .collect::<Vec<_>>()
            .join(",");

        match self.targets.default_level() {
            Some(level) if targets.is_empty() => write!(f, "{level}"),
            Some(level) => write!(f, "{level},{targets}"),
            None => write!(f, "{targets}"),
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value()
            .expect("no values are skipped")
            .get_name()
            .fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::{LogFormat, Targets};

    #[test]
    fn targets_keep_default_level() {
        let targets: Targets = "info,reelhost=debug".parse().expect("Valid targets");

        let reparsed: Targets = targets.to_string().parse().expect("Valid targets");

        assert_eq!(
            reparsed.targets.default_level(),
            targets.targets.default_level()
        );
        assert!(reparsed
            .targets
            .would_enable("reelhost::ingest", &tracing::Level::DEBUG));
        assert!(!reparsed
            .targets
            .would_enable("sled::tree", &tracing::Level::DEBUG));
    }

    #[test]
    fn log_format_names() {
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
    }
}
