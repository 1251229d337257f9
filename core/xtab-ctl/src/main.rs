//! xtab-ctl: settings CLI for xtab.
//!
//! Reads and writes the shared settings document directly and talks to the
//! daemon only for things it cannot own itself (snooze alarms, opening tabs).
//!
//! ## Subcommands
//!
//! - `status`: every toggle, with snooze time left and today's attempts
//! - `enable` / `disable`: flip a toggle; guarded toggles go through the
//!   confirm → choice → countdown flow to be disabled
//! - `click`: act like a click on the toggle's option row
//! - `open`: ask the daemon to open a URL in a background tab
//! - `check-url` / `check-link`: evaluate page rules against current settings
//! - `health`: daemon health report

mod daemon_client;
mod flow;
mod logging;

use clap::{Parser, Subcommand};
use std::sync::Arc;

use xtab_core::navigation::{background_tab_url, guarded_feature, redirect_target};
use xtab_core::{
    format_remaining, FeatureStatus, FrictionEngine, JsonFileStore, MessageSender, RemoteTimers,
    SettingsCache, StorageAdapter, SystemClock, Toggle, XtabError, XtabPaths,
};
use xtab_daemon_protocol::{Message, Request};

use daemon_client::DaemonClient;
use flow::{parse_choice, run_disable_flow, DisableChoice, FlowResult, TerminalPrompter};

#[derive(Parser)]
#[command(name = "xtab-ctl")]
#[command(about = "Focus settings for xtab")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every toggle and any active snooze
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Turn a toggle on (posts, notifications, home, explore)
    Enable {
        #[arg(value_name = "TOGGLE")]
        toggle: String,
    },

    /// Turn a toggle off. Home and explore require confirmation and a countdown
    Disable {
        #[arg(value_name = "TOGGLE")]
        toggle: String,

        /// Snooze instead of disabling: 15, 60, 240 or tomorrow
        #[arg(long, conflicts_with = "permanent")]
        snooze: Option<String>,

        /// Disable until turned back on
        #[arg(long)]
        permanent: bool,

        /// Answer yes at the confirmation step
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Click a toggle's option row. Guarded toggles can only be switched on this way
    Click {
        #[arg(value_name = "TOGGLE")]
        toggle: String,
    },

    /// Open a URL in a background tab via the daemon
    Open {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Print where each page would be redirected, if anywhere
    CheckUrl {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
    },

    /// Print the URL a link click would open in a background tab, if any
    CheckLink {
        #[arg(value_name = "HREF")]
        href: String,

        /// The link wraps a timestamp element
        #[arg(long)]
        has_time: bool,

        /// The link's data-testid attribute
        #[arg(long)]
        test_id: Option<String>,
    },

    /// Query daemon health
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let paths = match XtabPaths::from_home() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("xtab-ctl: {}", err);
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init(&paths.logs_dir());

    let client = Arc::new(DaemonClient::new(paths.socket_file()));
    let storage = StorageAdapter::new(Arc::new(JsonFileStore::new(paths.settings_file())));
    let engine = FrictionEngine::new(
        storage.clone(),
        Arc::new(RemoteTimers::new(client.clone())),
        Arc::new(SystemClock),
    );

    let result = match cli.command {
        Commands::Status { json } => {
            status(&engine, json).await;
            Ok(())
        }
        Commands::Enable { toggle } => enable(&engine, &toggle).await,
        Commands::Disable {
            toggle,
            snooze,
            permanent,
            yes,
        } => disable(&engine, &toggle, snooze.as_deref(), permanent, yes).await,
        Commands::Click { toggle } => click(&engine, &toggle).await,
        Commands::Open { url } => open(client.as_ref(), url).await,
        Commands::CheckUrl { urls } => {
            check_urls(&engine, &storage, &urls).await;
            Ok(())
        }
        Commands::CheckLink {
            href,
            has_time,
            test_id,
        } => {
            let cache = SettingsCache::load(&storage, Arc::new(SystemClock)).await;
            match background_tab_url(&href, has_time, test_id.as_deref(), &cache) {
                Some(url) => println!("background {}", url),
                None => println!("default"),
            }
            Ok(())
        }
        Commands::Health => health(client.as_ref()).await,
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "xtab-ctl command failed");
        eprintln!("xtab-ctl: {}", err);
        std::process::exit(1);
    }
}

async fn status(engine: &FrictionEngine, json: bool) {
    let states = engine.status_all().await;
    let toggles = engine.toggle_states().await;

    if json {
        let toggles: serde_json::Map<_, _> = toggles
            .iter()
            .map(|(toggle, on)| (toggle.to_string(), serde_json::Value::Bool(*on)))
            .collect();
        let report = serde_json::json!({ "toggles": toggles, "features": states });
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        return;
    }

    let now = engine.now();
    for (toggle, on) in toggles {
        let descriptor = toggle.descriptor();
        let detail = match descriptor.guards {
            Some(key) => {
                let Some(state) = states.iter().find(|state| state.feature == key) else {
                    continue;
                };
                let attempts = engine.attempts_today(state);
                let status = match state.status() {
                    FeatureStatus::Enabled => "on".to_string(),
                    FeatureStatus::Disabled => "off".to_string(),
                    FeatureStatus::Snoozed { .. } => format!(
                        "snoozed ({} left)",
                        state
                            .snooze_remaining(now)
                            .map(format_remaining)
                            .unwrap_or_else(|| "less than a minute".to_string())
                    ),
                };
                if attempts > 0 {
                    format!("{}, {} disable attempt(s) today", status, attempts)
                } else {
                    status
                }
            }
            None => (if on { "on" } else { "off" }).to_string(),
        };
        println!("{:<38} {}", descriptor.label, detail);
    }
}

async fn enable(engine: &FrictionEngine, toggle: &str) -> Result<(), XtabError> {
    let toggle: Toggle = toggle.parse()?;
    engine.set_toggle(toggle, true).await?;
    println!("{} enabled", toggle.descriptor().label);
    Ok(())
}

async fn disable(
    engine: &FrictionEngine,
    toggle: &str,
    snooze: Option<&str>,
    permanent: bool,
    yes: bool,
) -> Result<(), XtabError> {
    let toggle: Toggle = toggle.parse()?;
    let descriptor = toggle.descriptor();

    let Some(key) = descriptor.guards else {
        engine.set_toggle(toggle, false).await?;
        println!("{} disabled", descriptor.label);
        return Ok(());
    };

    let preset = match (snooze, permanent) {
        (Some(code), _) => Some(
            parse_choice(code).ok_or_else(|| XtabError::UnknownSnoozeDuration(code.to_string()))?,
        ),
        (None, true) => Some(DisableChoice::Permanent),
        (None, false) => None,
    };

    let mut prompter = TerminalPrompter::new(yes, preset);
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let result = run_disable_flow(engine, key, &mut prompter, cancel).await;
    println!();

    match result {
        FlowResult::AlreadyDisabled => println!("{} is already off", descriptor.label),
        FlowResult::Cancelled { .. } => println!("Cancelled; {} stays on", descriptor.label),
        FlowResult::Snoozed(applied) => {
            println!(
                "{} snoozed until {}",
                descriptor.label,
                applied.end_time.with_timezone(&chrono::Local).format("%a %H:%M")
            );
            if !applied.timer_armed {
                println!("Daemon unreachable; the snooze will end on the next status check after that");
            }
        }
        FlowResult::Disabled => println!("{} disabled", descriptor.label),
    }
    Ok(())
}

async fn click(engine: &FrictionEngine, toggle: &str) -> Result<(), XtabError> {
    let toggle: Toggle = toggle.parse()?;
    let descriptor = toggle.descriptor();
    let checked = engine
        .toggle_states()
        .await
        .into_iter()
        .find(|(candidate, _)| *candidate == toggle)
        .map(|(_, on)| on)
        .unwrap_or(descriptor.default_enabled);

    match descriptor.area_click(checked) {
        Some(on) => {
            engine.set_toggle(toggle, on).await?;
            println!(
                "{} {}",
                descriptor.label,
                if on { "enabled" } else { "disabled" }
            );
        }
        None => println!(
            "{} is on; use `xtab-ctl disable {}` to turn it off",
            descriptor.label, toggle
        ),
    }
    Ok(())
}

/// Checks pages the way the page side does: one cache, loaded once and kept
/// current from the adapter's change feed, with ended snoozes expired first.
async fn check_urls(engine: &FrictionEngine, storage: &StorageAdapter, urls: &[String]) {
    let changes = storage.subscribe();
    let cache = Arc::new(SettingsCache::load(storage, Arc::new(SystemClock)).await);
    let follower = {
        let cache = Arc::clone(&cache);
        let storage = storage.clone();
        tokio::spawn(async move { cache.follow(changes, &storage).await })
    };

    for url in urls {
        if let Some(feature) = guarded_feature(url) {
            engine.get_state(feature).await;
        }
        match redirect_target(url, &cache) {
            Some(target) => println!("{} redirect {}", url, target),
            None => println!("{} allow", url),
        }
    }
    follower.abort();
}

async fn open(client: &dyn MessageSender, url: String) -> Result<(), XtabError> {
    let response = client
        .send(Request::new(None, Message::OpenInNewTab { url }))
        .await?;
    if response.success {
        Ok(())
    } else {
        Err(XtabError::MessageDelivery(
            response
                .error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "Unknown daemon error".to_string()),
        ))
    }
}

async fn health(client: &dyn MessageSender) -> Result<(), XtabError> {
    let response = client.send(Request::new(None, Message::GetHealth)).await?;
    let data = response.data.unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&data).unwrap_or_default());
    Ok(())
}
