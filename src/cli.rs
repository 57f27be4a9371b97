//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged on top
//! of the configuration file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Republishes Nomad deployment and allocation events to Slack and Discord.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// HTTP address of the Nomad agent.
    #[arg(long, value_name = "URL")]
    pub nomad_addr: Option<String>,

    /// Base URL for links into the Nomad UI.
    #[arg(long, value_name = "URL")]
    pub ui_addr: Option<String>,

    /// Log level filter (e.g. "info", "nomad_notifier=debug").
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_address: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(address) = &self.metrics_address {
            dict.insert("metrics_address".into(), Value::from(address.clone()));
        }

        let mut nomad = Dict::new();
        if let Some(addr) = &self.nomad_addr {
            nomad.insert("address".into(), Value::from(addr.clone()));
        }
        if let Some(addr) = &self.ui_addr {
            nomad.insert("ui_address".into(), Value::from(addr.clone()));
        }
        if !nomad.is_empty() {
            dict.insert("nomad".into(), Value::from(nomad));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
