//! Configuration management for the notifier
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer defaults, a `nomad-notifier.toml` file, the
//! conventional `NOMAD_*`/`SLACK_*`/`DISCORD_*` environment variables,
//! `NOMAD_NOTIFIER_*` overrides and finally command-line arguments.

use crate::cli::Cli;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "nomad-notifier.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Address to serve Prometheus metrics on. Disabled when unset.
    pub metrics_address: Option<SocketAddr>,
    /// Connection to the Nomad agent.
    pub nomad: NomadConfig,
    /// Configuration for the Slack sink.
    pub slack: SlackConfig,
    /// Configuration for the Discord sink.
    pub discord: DiscordConfig,
    /// Allocation notification filtering.
    pub allocations: AllocationConfig,
}

/// Configuration for the Nomad event stream.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NomadConfig {
    /// HTTP address of the Nomad agent.
    pub address: String,
    /// ACL token sent as `X-Nomad-Token`.
    pub token: Option<String>,
    /// Base URL used for links into the Nomad UI. Defaults to `address`.
    pub ui_address: Option<String>,
}

impl NomadConfig {
    /// The base URL for UI deep links.
    pub fn ui_base(&self) -> &str {
        self.ui_address.as_deref().unwrap_or(&self.address)
    }
}

/// Configuration for the Slack sink.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SlackConfig {
    /// Bot user OAuth token, usually starting with "xoxb-".
    pub token: Option<String>,
    /// Channel ID messages are posted to.
    pub channel: Option<String>,
    /// Base URL of the Slack Web API.
    pub api_url: String,
}

/// Configuration for the Discord sink.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DiscordConfig {
    /// The Discord webhook URL.
    pub webhook_url: Option<String>,
}

/// Configuration for allocation filtering.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AllocationConfig {
    /// Allocations last modified longer ago than this are not announced.
    pub max_age_seconds: u64,
}

impl Config {
    /// Builds the layered figment without extracting it.
    pub fn figment(cli: &Cli) -> Figment {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(
                Env::prefixed("NOMAD_")
                    .filter(|key| {
                        key.as_str().eq_ignore_ascii_case("addr")
                            || key.as_str().eq_ignore_ascii_case("token")
                    })
                    .map(|key| {
                        if key.as_str().eq_ignore_ascii_case("addr") {
                            "nomad.address".into()
                        } else {
                            "nomad.token".into()
                        }
                    }),
            )
            .merge(Env::prefixed("SLACK_").map(|key| {
                format!("slack.{}", key.as_str().to_ascii_lowercase()).into()
            }))
            .merge(Env::prefixed("DISCORD_").map(|key| {
                format!("discord.{}", key.as_str().to_ascii_lowercase()).into()
            }))
            // e.g., NOMAD_NOTIFIER_ALLOCATIONS__MAX_AGE_SECONDS=600
            .merge(Env::prefixed("NOMAD_NOTIFIER_").split("__"))
            .merge(cli.clone())
    }

    /// Loads the application configuration.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config: Config = Self::figment(cli).extract()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
            nomad: NomadConfig::default(),
            slack: SlackConfig::default(),
            discord: DiscordConfig::default(),
            allocations: AllocationConfig::default(),
        }
    }
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:4646".to_string(),
            token: None,
            ui_address: None,
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            channel: None,
            api_url: "https://slack.com/api".to_string(),
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 300,
        }
    }
}
