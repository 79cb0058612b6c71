//! Background threads that feed synthetic events into the dispatcher.
//!
//! Both threads stop when the shutdown sender they were given is dropped.

use crate::capture::types::CapturedEvent;
use crate::dispatcher::EventHandler;
use crate::metadata::WindowSource;
use crossbeam_channel::{select, tick, Receiver};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Fire a window-query event every `interval`.
pub fn spawn_window_timer(
    handler: Arc<dyn EventHandler>,
    interval: Duration,
    shutdown: Receiver<()>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("window-timer".into())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        handler.on_event(CapturedEvent::window_query());
                    }
                    recv(shutdown) -> _ => break,
                }
            }
            debug!("window timer stopped");
        })
}

/// Poll the frontmost application every `interval` and emit an
/// app-activation event whenever it changes.
pub fn spawn_app_watcher(
    handler: Arc<dyn EventHandler>,
    windows: Arc<dyn WindowSource>,
    interval: Duration,
    shutdown: Receiver<()>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("app-watcher".into())
        .spawn(move || {
            let ticker = tick(interval);
            let mut watcher = AppWatcher::default();
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let name = windows.frontmost_app().map(|app| app.name);
                        if let Some(event) = watcher.observe(name) {
                            handler.on_event(event);
                        }
                    }
                    recv(shutdown) -> _ => break,
                }
            }
            debug!("app watcher stopped");
        })
}

/// Remembers the last frontmost application.
#[derive(Debug, Default)]
pub struct AppWatcher {
    current: Option<String>,
}

impl AppWatcher {
    /// Returns an activation event if `frontmost` differs from the last
    /// application seen. An unknown frontmost app leaves the state unchanged.
    pub fn observe(&mut self, frontmost: Option<String>) -> Option<CapturedEvent> {
        let name = frontmost?;
        if self.current.as_deref() == Some(name.as_str()) {
            return None;
        }
        self.current = Some(name.clone());
        Some(CapturedEvent::app_activation(name))
    }
}
