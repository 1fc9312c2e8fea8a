use crate::logger::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// `astra`: a chat bot that keeps a Notion task list and talks back.
#[derive(Parser, Debug, Clone)]
#[command(name = "astra", version, about = "Telegram task assistant backed by Notion and Ollama")]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "ASTRA_CONFIG", default_value = "astra.toml")]
    pub config: PathBuf,

    /// Logging verbosity when `RUST_LOG` is not set
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Override the engagement sweep interval from the config file
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_secs: Option<u64>,

    /// Run a single engagement sweep and exit
    #[arg(long)]
    pub sweep_once: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = Args::try_parse_from([
            "astra",
            "--config",
            "bot.toml",
            "--log-level",
            "debug",
            "--sweep-interval-secs",
            "60",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("bot.toml"));
        assert!(matches!(args.log_level, LogLevel::Debug));
        assert_eq!(args.sweep_interval_secs, Some(60));
        assert!(!args.sweep_once);
    }

    #[test]
    fn rejects_zero_sweep_interval() {
        let parsed = Args::try_parse_from(["astra", "--sweep-interval-secs", "0"]);
        assert!(parsed.is_err());
    }
}
