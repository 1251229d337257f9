//! xtab daemon entrypoint.
//!
//! The long-lived background process. It owns snooze alarms, reconciles them
//! with the shared store on every start, shows re-enable notices, and answers
//! requests from the CLI over a Unix socket. Nothing held in memory here is
//! durable: a restart rebuilds everything from `settings.json`.

use fs_err as fs;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use xtab_core::{
    DaemonConfig, JsonFileStore, MessageRouter, StorageAdapter, SystemClock, TimerReconciler,
    XtabPaths,
};

mod alarms;
mod notifier;
mod server;
mod tabs;

use alarms::TokioAlarms;
use notifier::NotificationCenter;
use tabs::SystemTabs;

#[tokio::main]
async fn main() {
    init_logging();

    let paths = match XtabPaths::from_home() {
        Ok(paths) => paths,
        Err(err) => {
            error!(error = %err, "Failed to resolve xtab data directory");
            std::process::exit(1);
        }
    };
    let config = DaemonConfig::load_or_default(&paths.daemon_config_file());
    debug!(?config, "Daemon config loaded");

    let storage = StorageAdapter::new(Arc::new(JsonFileStore::new(paths.settings_file())));
    let (alarms, mut fired) = TokioAlarms::new(Handle::current());
    let notifier = NotificationCenter::new(
        Handle::current(),
        Duration::from_secs(config.notification_dismiss_secs),
    );
    let reconciler = Arc::new(TimerReconciler::new(
        storage,
        Arc::new(alarms),
        Arc::new(notifier),
        Arc::new(SystemClock),
    ));

    let report = reconciler.on_startup().await;
    info!(
        expired = ?report.expired,
        rearmed = ?report.rearmed,
        "Startup reconciliation complete"
    );

    let router = Arc::new(
        MessageRouter::new(Arc::clone(&reconciler), Arc::new(SystemTabs::new(config.open_tabs)))
            .with_version(env!("CARGO_PKG_VERSION")),
    );

    let socket_path = paths.socket_file();
    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }
    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }
    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };
    info!(path = %socket_path.display(), "xtab daemon started");

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(error = %err, "Failed to install SIGTERM handler");
            None
        }
    };
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::spawn(server::handle_connection(stream, Arc::clone(&router)));
                }
                Err(err) => {
                    warn!(error = %err, "Failed to accept daemon connection");
                }
            },
            Some(name) = fired.recv() => {
                let reconciler = Arc::clone(&reconciler);
                tokio::spawn(async move {
                    reconciler.on_timer_fired(&name).await;
                });
            }
            _ = &mut ctrl_c => {
                info!("Interrupted; shutting down");
                break;
            }
            _ = recv_terminate(&mut terminate) => {
                info!("Terminated; shutting down");
                break;
            }
        }
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        warn!(error = %err, "Failed to remove socket on shutdown");
    }
}

async fn recv_terminate(terminate: &mut Option<tokio::signal::unix::Signal>) {
    match terminate {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn init_logging() {
    let debug_enabled = env::var("XTAB_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}
