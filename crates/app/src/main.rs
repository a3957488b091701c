use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use kassa::{logging, Config, ConfigError, Settings, SyncManager, DEFAULT_CONFIG_PATH};
use kassa_core::{PeriodError, SyncReport, SyncWindow};
use kassa_match::MatchEngine;
use kassa_notify::{LogNotifier, Notifier, TelegramConfig, TelegramNotifier};
use kassa_sources::{PosterClient, PrivatClient};
use kassa_storage::JsonFileStore;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "kassa",
    version,
    about = "Reconcile PrivatBank statements against Poster finance records"
)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, env = "KASSA_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Days to look back from today (overrides settings.lookback_days)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    lookback_days: Option<u32>,

    /// Explicit window start, YYYY-MM-DD
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Explicit window end, YYYY-MM-DD
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Match without saving ids; the report only goes to the log
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Parsed but not yet validated: logging and the notifier must work even
    // when another section is wrong.
    let parsed = Config::read(&cli.config);
    match &parsed {
        Ok(c) => logging::init(&c.settings.log_level, c.settings.log_file.as_deref()),
        Err(_) => logging::init("info", None),
    }
    let notifier = notifier(parsed.as_ref().ok(), cli.dry_run);

    let report = match parsed.and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => {
            tracing::debug!(
                path = %cli.config.display(),
                rule = config.matching.kind(),
                "Configuration loaded"
            );
            match sync(&cli, &config).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Sync could not start: {e:#}");
                    SyncReport::failed("N/A", "N/A", format!("Sync could not start: {e:#}"))
                }
            }
        }
        Err(e) => config_failure(&e),
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!("Failed to serialize report: {e}"),
        }
    }

    if let Err(e) = notifier.send(&report).await {
        tracing::error!("Failed to send notification: {e}");
    }

    if report.is_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn config_failure(e: &ConfigError) -> SyncReport {
    tracing::error!("Configuration error: {e}");
    SyncReport::failed("N/A", "N/A", format!("Configuration error: {e}"))
}

async fn sync(cli: &Cli, config: &Config) -> Result<SyncReport> {
    let window = resolve_window(
        cli.start.zip(cli.end),
        cli.lookback_days,
        &config.settings,
        Local::now().date_naive(),
    )
    .context("Invalid sync window")?;

    let privat = PrivatClient::new(config.privatbank.clone())
        .context("Failed to set up PrivatBank client")?;
    let poster =
        PosterClient::new(config.poster.clone()).context("Failed to set up Poster client")?;
    let store = JsonFileStore::new(&config.settings.matched_ids_path);

    let manager = SyncManager::new(privat, poster, store, MatchEngine::new(config.matching.clone()))
        .with_date_format(&config.settings.date_format)
        .with_dry_run(cli.dry_run);
    Ok(manager.run(&window).await)
}

/// Telegram when configured, the log otherwise or on a dry run.
fn notifier(config: Option<&Config>, dry_run: bool) -> Box<dyn Notifier> {
    let Some(telegram) = telegram_target(config, dry_run) else {
        return Box::new(LogNotifier);
    };
    match TelegramNotifier::new(telegram) {
        Ok(n) => Box::new(n),
        Err(e) => {
            tracing::error!("Telegram notifier unavailable, falling back to the log: {e}");
            Box::new(LogNotifier)
        }
    }
}

fn telegram_target(config: Option<&Config>, dry_run: bool) -> Option<TelegramConfig> {
    match config.and_then(|c| c.telegram.clone()) {
        Some(_) if dry_run => {
            tracing::info!("Dry run, report goes to the log only");
            None
        }
        Some(telegram) => Some(telegram),
        None => {
            tracing::warn!("Telegram not configured, report goes to the log only");
            None
        }
    }
}

fn resolve_window(
    explicit: Option<(NaiveDate, NaiveDate)>,
    lookback_days: Option<u32>,
    settings: &Settings,
    today: NaiveDate,
) -> Result<SyncWindow, PeriodError> {
    match explicit {
        Some((start, end)) => SyncWindow::new(start, end),
        None => SyncWindow::lookback(today, lookback_days.unwrap_or(settings.lookback_days)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_requires_both_window_ends() {
        assert!(Cli::try_parse_from(["kassa", "--start", "2025-05-01"]).is_err());
        let cli = Cli::try_parse_from(["kassa", "--start", "2025-04-01", "--end", "2025-04-30", "--json"])
            .unwrap();
        assert_eq!(cli.start, Some(date(2025, 4, 1)));
        assert!(cli.json);
        assert!(!cli.dry_run);
    }

    #[test]
    fn window_from_settings_lookback() {
        let settings = Settings::default();
        let window = resolve_window(None, None, &settings, date(2025, 5, 1)).unwrap();
        assert_eq!(window.start, date(2025, 4, 30));
        assert_eq!(window.end, date(2025, 5, 1));
    }

    #[test]
    fn cli_lookback_overrides_settings() {
        let window = resolve_window(None, Some(7), &Settings::default(), date(2025, 5, 8)).unwrap();
        assert_eq!(window.start, date(2025, 5, 1));
    }

    #[test]
    fn explicit_window_is_validated() {
        let settings = Settings::default();
        let explicit = Some((date(2025, 5, 2), date(2025, 5, 1)));
        assert!(matches!(
            resolve_window(explicit, None, &settings, date(2025, 5, 8)),
            Err(PeriodError::Inverted { .. })
        ));
    }

    const INVALID_WITH_TELEGRAM: &str = r#"
        [privatbank]
        token = "t"
        iban = "UA00"
        [poster]
        token = "t"
        account_id = 0
        [telegram]
        token = "123:abc"
        chat_id = -100500
    "#;

    #[test]
    fn invalid_config_still_reports_to_telegram() {
        let config = Config::from_toml(INVALID_WITH_TELEGRAM).unwrap();
        assert!(config.validate().is_err());

        let target = telegram_target(Some(&config), false).unwrap();
        assert_eq!(target.chat_id, "-100500");
    }

    #[test]
    fn dry_run_and_missing_config_stay_in_log() {
        let config = Config::from_toml(INVALID_WITH_TELEGRAM).unwrap();
        assert!(telegram_target(Some(&config), true).is_none());
        assert!(telegram_target(None, false).is_none());
    }

    #[test]
    fn config_failure_message_is_prefixed_once() {
        let report = config_failure(&ConfigError::Invalid(
            "poster.account_id must be positive, got 0".into(),
        ));
        assert_eq!(
            report.error_message.as_deref(),
            Some("Configuration error: poster.account_id must be positive, got 0")
        );
        assert!(report.is_failed());
    }
}
