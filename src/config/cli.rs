use std::path::PathBuf;

use clap::Parser;

use super::{AppConfig, Result};
use crate::confirmation::ConfirmationPolicy;

/// Operator console for a serial-controlled centrifuge.
///
/// Type `<rpm> <seconds>`, `<rpm>,<seconds>` or free text such as
/// "2000 rpm for 5 minutes". `:set <rpm> [seconds]` uses the manual form,
/// `:voice` listens for a spoken command and `quit` ends the run.
#[derive(Debug, Parser)]
#[command(name = "centrifuge-control", version, about)]
pub struct Cli {
    /// JSON config file. Missing keys take their defaults.
    #[arg(long, env = "CENTRIFUGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serial port (e.g. /dev/ttyACM0, COM3). Defaults to the first USB port found.
    #[arg(long, env = "CENTRIFUGE_PORT")]
    pub port: Option<String>,

    /// Override the baud rate.
    #[arg(long)]
    pub baud: Option<u32>,

    /// List USB serial ports and exit.
    #[arg(long)]
    pub list_ports: bool,

    /// Mirror log output into this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Disable voice input even if the config enables it.
    #[arg(long)]
    pub no_voice: bool,

    /// Override which voice commands need a spoken yes.
    #[arg(long, value_parser = parse_policy)]
    pub confirm: Option<ConfirmationPolicy>,

    /// Override the control loop period in milliseconds.
    #[arg(long)]
    pub tick_ms: Option<u64>,
}

fn parse_policy(s: &str) -> std::result::Result<ConfirmationPolicy, String> {
    match s.to_ascii_lowercase().replace('-', "_").as_str() {
        "always" => Ok(ConfirmationPolicy::Always),
        "duration_only" => Ok(ConfirmationPolicy::DurationOnly),
        "never" => Ok(ConfirmationPolicy::Never),
        other => Err(format!("unknown confirmation policy {other:?} (always, duration-only, never)")),
    }
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied
    pub fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(policy) = self.confirm {
            config.voice.confirmation_policy = policy;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.session.tick_interval_ms = tick_ms;
        }
        if self.no_voice {
            config.voice.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}
