//! Hot reload of the gateway config file.
//!
//! Editors save in bursts (truncate, write, chmod, or write-then-rename), so
//! filesystem events are collapsed until the file has been quiet for the
//! debounce window, and only then is it reloaded and validated. Invalid
//! rewrites are logged and dropped; the running configuration stays.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Quiet period after the last event before the file is reloaded.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver validated configs arrive on.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            update_tx,
        };
        (watcher, update_rx)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a tokio runtime. Watching stops
    /// when the returned watcher is dropped.
    ///
    /// The parent directory is watched rather than the file itself, so a
    /// save that replaces the file through a rename is still seen.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let file_name = self.path.file_name().map(OsString::from).ok_or_else(|| {
            notify::Error::generic("config path has no file name")
                .add_path(self.path.clone())
        })?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &file_name) => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(
            path = %self.path.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Config watcher started"
        );
        tokio::spawn(reload_on_change(self.path, self.debounce, event_rx, self.update_tx));
        Ok(watcher)
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Reload once per burst of events. Ends when the notify watcher is dropped
/// or nobody is listening for updates any more.
async fn reload_on_change(
    path: PathBuf,
    debounce: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<GatewayConfig>,
) {
    while events.recv().await.is_some() {
        let mut coalesced = 1u32;
        loop {
            match time::timeout(debounce, events.recv()).await {
                Ok(Some(())) => coalesced += 1,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        tracing::info!(path = %path.display(), events = coalesced, "Config file changed, reloading");
        match load_config(&path) {
            Ok(config) => {
                tracing::info!(endpoints = config.endpoints.len(), "Configuration reloaded");
                if updates.send(config).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
            }
        }
    }
    tracing::debug!("Config watcher stopped");
}
