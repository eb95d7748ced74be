use anaglyph::config::{Config, ConfigChange};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use tracing::{error, info, warn};

/// Watches the config file and turns edits into [`ConfigChange`]s.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<std::result::Result<Event, notify::Error>>,
    current: Config,
}

impl ConfigWatcher {
    /// Start watching `path`. `current` is the config already applied.
    pub fn new(path: PathBuf, current: Config) -> Option<Self> {
        let (tx, rx) = channel();

        match RecommendedWatcher::new(tx, notify::Config::default()) {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                    warn!("Failed to watch config file {:?}: {}", path, e);
                    return None;
                }
                info!("Watching config file {:?} for changes", path);
                Some(Self {
                    path,
                    _watcher: watcher,
                    rx,
                    current,
                })
            }
            Err(e) => {
                warn!("Failed to create config watcher: {}", e);
                None
            }
        }
    }

    /// Drains pending file events and returns what changed since the last
    /// successful load. A file that fails to parse changes nothing.
    pub fn check_for_changes(&mut self) -> Vec<ConfigChange> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            if let Ok(event) = res {
                if matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) {
                    needs_reload = true;
                }
            }
        }

        if !needs_reload {
            return Vec::new();
        }

        info!("Config file changed, checking for updates...");
        match Config::load(&self.path) {
            Ok(next) => {
                let changes = self.current.diff(&next);
                self.current = next;
                changes
            }
            Err(e) => {
                error!("Failed to reload config: {}", e);
                Vec::new()
            }
        }
    }
}
