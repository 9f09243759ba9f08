use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use kneading::entry::EntryForm;
use kneading::http_gateway::HttpLeaderboard;
use kneading::kiosk::Kiosk;
use kneading::leaderboard::{LeaderboardGateway, MemoryLeaderboard};
use kneading::logging::init_tracing;
use kneading::nickname::NicknameGenerator;
use kneading::runtime;
use kneading::settings::SettingsStore;

#[derive(Debug, Parser)]
#[command(name = "kneading")]
#[command(about = "Console kiosk for the kneading challenge")]
struct Cli {
    /// Settings file (defaults to KNEAD_SETTINGS_PATH or the user config dir).
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Leaderboard service base URL; overrides the settings file.
    #[arg(long)]
    leaderboard_url: Option<String>,
    /// Seed for reproducible nicknames.
    #[arg(long)]
    seed: Option<u64>,
    /// Write the effective (sanitized) settings to the settings file and exit.
    #[arg(long)]
    write_settings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    Tap(u32),
    Submit(EntryForm),
    Show,
    Quit,
}

fn parse_consent(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" | "" => Ok(false),
        other => Err(format!("consent must be yes or no, got {other:?}")),
    }
}

fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));

    match verb {
        "" | "t" | "tap" => {
            if rest.is_empty() {
                return Ok(ConsoleCommand::Tap(1));
            }
            rest.parse::<u32>()
                .map(ConsoleCommand::Tap)
                .map_err(|_| format!("tap count must be a number, got {rest:?}"))
        }
        "submit" => {
            let fields: Vec<&str> = rest.split('|').collect();
            let [name, phone, email, consent] = fields.as_slice() else {
                return Err("usage: submit name|phone|email|yes".to_string());
            };
            Ok(ConsoleCommand::Submit(EntryForm::new(
                name.trim(),
                phone.trim(),
                email.trim(),
                parse_consent(consent)?,
            )))
        }
        "s" | "show" => Ok(ConsoleCommand::Show),
        "q" | "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(format!(
            "unknown command {other:?} (try: tap [n], submit name|phone|email|yes, show, quit)"
        )),
    }
}

async fn run_console<G: LeaderboardGateway>(kiosk: Kiosk, gateway: G) -> Result<()> {
    let (handle, task) = runtime::spawn(kiosk, gateway);

    let mut notices = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => match serde_json::to_string(&notice) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::warn!(error = %err, "failed to encode notice"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "console fell behind on notices");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match parse_command(&line) {
            Ok(ConsoleCommand::Tap(count)) => {
                for _ in 0..count {
                    handle.tap()?;
                }
            }
            Ok(ConsoleCommand::Submit(form)) => handle.submit_form(form)?,
            Ok(ConsoleCommand::Show) => {
                let snapshot = handle.snapshot().await?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            Ok(ConsoleCommand::Quit) => break,
            Err(msg) => eprintln!("{msg}"),
        }
    }

    // The runtime may already be gone if stdin closed after a crash.
    let _ = handle.shutdown();
    task.await.context("kiosk runtime panicked")?;
    printer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    let cli = Cli::parse();

    let store = match &cli.settings {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::from_env(),
    };
    let mut settings = store.load();
    if let Some(url) = cli.leaderboard_url {
        settings.leaderboard.url = Some(url);
    }
    let settings = settings.sanitized();
    tracing::info!(path = %store.path().display(), rules = ?settings.rules, "settings loaded");

    if cli.write_settings {
        store
            .save(&settings)
            .with_context(|| format!("failed to write {}", store.path().display()))?;
        println!("{}", store.path().display());
        return Ok(());
    }

    let kiosk = match cli.seed {
        Some(seed) => Kiosk::new(
            settings.rules,
            settings.audio,
            NicknameGenerator::seeded(seed),
        ),
        None => Kiosk::from_settings(&settings),
    };

    match settings.leaderboard.url.clone() {
        Some(url) => {
            tracing::info!(%url, "using remote leaderboard");
            let gateway = HttpLeaderboard::new(url).with_timeout(settings.leaderboard.timeout);
            run_console(kiosk, gateway).await
        }
        None => {
            tracing::warn!("no leaderboard url configured; scores stay in memory");
            run_console(kiosk, MemoryLeaderboard::new()).await
        }
    }
}
