use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use keyrack_core::CabinetConfig;

#[derive(Parser, Debug)]
#[command(name = "keyrack", version, about = "Key cabinet release coordinator")]
pub struct Cli {
    /// Cabinet configuration file (TOML); built-in defaults when omitted
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Remote authority address, overriding `channel.server_addr`
    #[arg(long)]
    pub server: Option<String>,

    /// Drive the simulated cabinet even if hardware is present
    #[arg(long)]
    pub mock: bool,

    /// Validate the configuration, report detected hardware, and exit
    #[arg(long)]
    pub check: bool,
}

impl Cli {
    /// Load the configuration file and apply command-line overrides.
    pub fn load_config(&self) -> Result<CabinetConfig> {
        let mut config = CabinetConfig::load_or_default(self.config.as_deref())
            .with_context(|| match &self.config {
                Some(path) => format!("loading {}", path.display()),
                None => "building default configuration".to_string(),
            })?;

        if let Some(server) = &self.server {
            config.channel.server_addr.clone_from(server);
        }
        if self.mock {
            config.hardware.force_mock = true;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
