use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use ior_experiment::ExperimentConfig;

use crate::logging::LogFormat;

/// Retinotopic inhibition-of-return task with a mouse standing in for the
/// eye tracker.
#[derive(Parser, Debug)]
#[command(name = "retino-ior", author, version, about)]
pub struct Cli {
    /// JSON experiment configuration. Defaults apply to anything omitted.
    #[arg(short, long, env = "RETINO_IOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Participant identifier written to every record.
    #[arg(short, long)]
    pub participant: Option<String>,

    /// Where completed trials are written at the end of the session.
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// JSON-lines file that aborted trials are appended to.
    #[arg(long)]
    pub errors: Option<PathBuf>,

    /// TrueType font for on-screen messages.
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Seed for trial order.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run in a window instead of borderless fullscreen.
    #[arg(long)]
    pub windowed: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Loads the configured file (or defaults) and layers the flags on top.
    pub fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut ExperimentConfig) {
        let session = &mut config.session;
        if let Some(p) = &self.participant {
            session.participant_id = p.clone();
        }
        if let Some(p) = &self.results {
            session.results_path = p.clone();
        }
        if let Some(p) = &self.errors {
            session.error_log_path = p.clone();
        }
        if self.seed.is_some() {
            session.seed = self.seed;
        }
        if self.font.is_some() {
            config.display.font_path = self.font.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"session": {{"participant_id": "from-file", "repetitions": 2}}}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let cli = Cli::parse_from(["retino-ior", "-c", &path, "-p", "p07", "--seed", "9", "-vv"]);
        let config = cli.experiment_config().unwrap();
        assert_eq!(config.session.participant_id, "p07");
        assert_eq!(config.session.repetitions, 2);
        assert_eq!(config.session.seed, Some(9));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn defaults_without_config_file() {
        let cli = Cli::parse_from(["retino-ior", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        let config = cli.experiment_config().unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let cli = Cli::parse_from(["retino-ior", "-c", "/nonexistent/retino.json"]);
        let err = cli.experiment_config().unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/retino.json"));
    }
}
