use std::path::PathBuf;

use clap::Parser;
use hosunlock_config::ConfigOverrides;

/// Watches the daily unlock window and applies at each configured threshold.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(long, env = "HOSUNLOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Start monitoring without waiting for Enter
    #[arg(long, env = "HOSUNLOCK_AUTO_RUN")]
    pub auto_run: bool,

    /// Attempt cycles allowed, the first one included
    #[arg(long, env = "HOSUNLOCK_MAX_RETRIES", value_parser = clap::value_parser!(u32).range(1..=365))]
    pub max_retries: Option<u32>,

    /// Retries per API call
    #[arg(long, env = "HOSUNLOCK_MAX_API_RETRIES", value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_api_retries: Option<u32>,

    /// Base delay between API retries in milliseconds
    #[arg(long, env = "HOSUNLOCK_API_RETRY_WAIT", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub api_retry_wait: Option<u32>,

    /// Keep the API retry delay constant instead of scaling it by attempt
    #[arg(long, env = "HOSUNLOCK_FIXED_RETRY_WAIT")]
    pub fixed_retry_wait: bool,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            auto_run: self.auto_run,
            max_auto_retries: self.max_retries,
            max_api_retries: self.max_api_retries,
            api_retry_wait_ms: self.api_retry_wait,
            fixed_retry_wait: self.fixed_retry_wait,
        }
    }
}
