use clap::Parser;
use figment::Jail;
use nomad_notifier::cli::Cli;
use nomad_notifier::config::{Config, DEFAULT_CONFIG_FILE};

fn load(cli: &Cli) -> Result<Config, figment::Error> {
    Config::figment(cli).extract()
}

#[test]
fn test_defaults_without_any_source() {
    Jail::expect_with(|_jail| {
        let config = load(&Cli::default())?;
        assert_eq!(config, Config::default());
        assert_eq!(config.nomad.address, "http://127.0.0.1:4646");
        assert_eq!(config.nomad.ui_base(), "http://127.0.0.1:4646");
        assert_eq!(config.slack.api_url, "https://slack.com/api");
        assert_eq!(config.allocations.max_age_seconds, 300);
        assert!(config.metrics_address.is_none());
        Ok(())
    });
}

#[test]
fn test_load_full_config_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            DEFAULT_CONFIG_FILE,
            r#"
                log_level = "debug"
                metrics_address = "0.0.0.0:9102"

                [nomad]
                address = "http://nomad.service:4646"
                token = "acl-token"
                ui_address = "https://nomad.example.com/"

                [slack]
                token = "xoxb-file"
                channel = "C0FILE"

                [discord]
                webhook_url = "https://discord.com/api/webhooks/1/file"

                [allocations]
                max_age_seconds = 60
            "#,
        )?;

        let config = load(&Cli::default())?;
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.metrics_address, Some("0.0.0.0:9102".parse().unwrap()));
        assert_eq!(config.nomad.address, "http://nomad.service:4646");
        assert_eq!(config.nomad.token.as_deref(), Some("acl-token"));
        assert_eq!(config.nomad.ui_base(), "https://nomad.example.com/");
        assert_eq!(config.slack.token.as_deref(), Some("xoxb-file"));
        assert_eq!(config.slack.channel.as_deref(), Some("C0FILE"));
        assert_eq!(
            config.discord.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/file")
        );
        assert_eq!(config.allocations.max_age_seconds, 60);
        Ok(())
    });
}

#[test]
fn test_conventional_environment_variables() {
    Jail::expect_with(|jail| {
        jail.set_env("NOMAD_ADDR", "http://env-nomad:4646");
        jail.set_env("NOMAD_TOKEN", "env-token");
        jail.set_env("SLACK_TOKEN", "xoxb-env");
        jail.set_env("SLACK_CHANNEL", "C0ENV");
        jail.set_env("DISCORD_WEBHOOK_URL", "https://discord.com/api/webhooks/1/env");

        let config = load(&Cli::default())?;
        assert_eq!(config.nomad.address, "http://env-nomad:4646");
        assert_eq!(config.nomad.token.as_deref(), Some("env-token"));
        assert_eq!(config.slack.token.as_deref(), Some("xoxb-env"));
        assert_eq!(config.slack.channel.as_deref(), Some("C0ENV"));
        assert_eq!(
            config.discord.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/env")
        );
        Ok(())
    });
}

#[test]
fn test_prefixed_environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            DEFAULT_CONFIG_FILE,
            r#"
                [allocations]
                max_age_seconds = 60
            "#,
        )?;
        jail.set_env("NOMAD_NOTIFIER_ALLOCATIONS__MAX_AGE_SECONDS", "900");
        jail.set_env("NOMAD_NOTIFIER_LOG_LEVEL", "trace");

        let config = load(&Cli::default())?;
        assert_eq!(config.allocations.max_age_seconds, 900);
        assert_eq!(config.log_level, "trace");
        Ok(())
    });
}

#[test]
fn test_cli_overrides_everything() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
                log_level = "warn"
                [nomad]
                address = "http://file:4646"
            "#,
        )?;
        jail.set_env("NOMAD_ADDR", "http://env:4646");

        let cli = Cli::try_parse_from([
            "nomad-notifier",
            "--config",
            "custom.toml",
            "--nomad-addr",
            "http://cli:4646",
            "--ui-addr",
            "https://ui.example.com",
            "--metrics-address",
            "127.0.0.1:9000",
        ])
        .unwrap();

        let config = load(&cli)?;
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.nomad.address, "http://cli:4646");
        assert_eq!(config.nomad.ui_base(), "https://ui.example.com");
        assert_eq!(config.metrics_address, Some("127.0.0.1:9000".parse().unwrap()));
        Ok(())
    });
}

#[test]
fn test_invalid_value_is_reported() {
    Jail::expect_with(|jail| {
        jail.set_env("NOMAD_NOTIFIER_METRICS_ADDRESS", "not-an-address");
        assert!(Config::load(&Cli::default()).is_err());
        Ok(())
    });
}
