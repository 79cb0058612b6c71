//! Capture dispatcher: classifies each intercepted event and produces the
//! verdict handed back to the OS.

use crate::arbiter::Arbiter;
use crate::capture::types::{CapturedEvent, EventKind, Verdict};
use crate::config::{BlockingPolicy, Config};
use crate::metadata::WindowSource;
use crate::sink::Emitter;
use crate::stats::SharedStats;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// Receives every event delivered by the OS binding and answers synchronously.
pub trait EventHandler: Send + Sync {
    /// Handle one event. Blocking kinds may take up to the decision timeout.
    fn on_event(&self, event: CapturedEvent) -> Verdict;

    /// The OS switched the capture registration off.
    fn on_tap_disabled(&self, reason: TapDisableReason) -> TapAction;
}

/// Why the OS disabled the event tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDisableReason {
    /// A callback took too long and the OS watchdog fired.
    Timeout,
    /// Secure input or a similar user-driven condition.
    UserInput,
}

/// What the capture loop should do after the tap was disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    Reenable,
    Terminate,
}

/// Routes events to the encoder or the arbiter according to a [`BlockingPolicy`].
pub struct CaptureDispatcher {
    emitter: Arc<Emitter>,
    arbiter: Arc<Arbiter>,
    windows: Arc<dyn WindowSource>,
    stats: SharedStats,
    policy: BlockingPolicy,
    window_info_on_activation: bool,
    max_tap_reenables: u32,
    tap_disables: AtomicU32,
}

impl CaptureDispatcher {
    pub fn new(
        config: &Config,
        emitter: Arc<Emitter>,
        arbiter: Arc<Arbiter>,
        windows: Arc<dyn WindowSource>,
        stats: SharedStats,
    ) -> Self {
        Self {
            emitter,
            arbiter,
            windows,
            stats,
            policy: config.blocking,
            window_info_on_activation: config.window_info_on_activation,
            max_tap_reenables: config.max_tap_reenables,
            tap_disables: AtomicU32::new(0),
        }
    }

    /// Whether `event` waits for a host verdict.
    pub fn is_blocking(&self, event: &CapturedEvent) -> bool {
        (self.policy.pointer_buttons && event.is_pointer_button())
            || (self.policy.keys && event.is_key_press())
    }

    /// Query window metadata and emit one `ACTIVE` and one `ALL` line.
    pub fn emit_window_info(&self) {
        let active = self.windows.active_window();
        let all = self.windows.all_windows();
        self.emitter.emit(|enc| {
            vec![
                enc.encode_active_window(active.as_ref()),
                enc.encode_windows(&all),
            ]
        });
    }
}

impl EventHandler for CaptureDispatcher {
    fn on_event(&self, event: CapturedEvent) -> Verdict {
        trace!(kind = ?event.kind, subkind = ?event.subkind, code = event.code, "event");

        match event.kind {
            EventKind::WindowQuery => {
                self.emit_window_info();
                Verdict::Propagate
            }
            _ if self.is_blocking(&event) => self.arbiter.request_decision(&event),
            EventKind::AppActivation => {
                let active = self
                    .window_info_on_activation
                    .then(|| self.windows.active_window());
                self.emitter.emit(|enc| {
                    let mut records = enc.encode(&event);
                    if let Some(active) = &active {
                        records.push(enc.encode_active_window(active.as_ref()));
                    }
                    records
                });
                Verdict::Propagate
            }
            _ => {
                self.emitter.emit(|enc| enc.encode(&event));
                Verdict::Propagate
            }
        }
    }

    fn on_tap_disabled(&self, reason: TapDisableReason) -> TapAction {
        self.stats.record_tap_disabled();
        let count = self.tap_disables.fetch_add(1, Ordering::SeqCst) + 1;

        if count > self.max_tap_reenables {
            error!(?reason, count, "event tap disabled too many times, stopping capture");
            TapAction::Terminate
        } else {
            error!(?reason, count, "event tap disabled by the OS, re-enabling");
            TapAction::Reenable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::SubKind;
    use crate::encoder::{Encoder, SequenceCounter};
    use crate::metadata::{AppInfo, NoWindows, WindowInfo};
    use crate::sink::ChannelSink;
    use crate::stats::BridgeStats;
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    struct OneWindow;

    impl WindowSource for OneWindow {
        fn active_window(&self) -> Option<WindowInfo> {
            Some(WindowInfo {
                owner_name: "Terminal".into(),
                ..WindowInfo::default()
            })
        }

        fn all_windows(&self) -> Vec<WindowInfo> {
            self.active_window().into_iter().collect()
        }

        fn frontmost_app(&self) -> Option<AppInfo> {
            None
        }
    }

    fn build(
        config: &Config,
        windows: Arc<dyn WindowSource>,
    ) -> (CaptureDispatcher, Receiver<String>) {
        let (sink, rx) = ChannelSink::channel();
        let stats = Arc::new(BridgeStats::new());
        let emitter = Arc::new(Emitter::new(
            Encoder::new(Arc::new(SequenceCounter::new())),
            Arc::new(sink),
            stats.clone(),
        ));
        let arbiter = Arc::new(Arbiter::new(
            Duration::from_millis(5),
            emitter.clone(),
            stats.clone(),
        ));
        let dispatcher = CaptureDispatcher::new(config, emitter, arbiter, windows, stats);
        (dispatcher, rx)
    }

    #[test]
    fn test_blocking_classification() {
        let (dispatcher, _rx) = build(&Config::default(), Arc::new(NoWindows));
        let click = CapturedEvent::pointer_button(SubKind::Up, 1, (0.0, 0.0));
        let key = CapturedEvent::key(SubKind::Down, 0, "a", (0.0, 0.0), Default::default());

        assert!(dispatcher.is_blocking(&click));
        assert!(!dispatcher.is_blocking(&key));
        assert!(!dispatcher.is_blocking(&CapturedEvent::pointer_move((0.0, 0.0))));
        assert!(!dispatcher.is_blocking(&CapturedEvent::scroll(1, (0.0, 0.0))));

        let mut config = Config::default();
        config.blocking.keys = true;
        let (dispatcher, _rx) = build(&config, Arc::new(NoWindows));
        assert!(dispatcher.is_blocking(&key));
    }

    #[test]
    fn test_non_blocking_events_propagate_immediately() {
        let (dispatcher, rx) = build(&Config::default(), Arc::new(NoWindows));

        let verdict = dispatcher.on_event(CapturedEvent::scroll(2, (3.0, 4.0)));
        assert_eq!(verdict, Verdict::Propagate);
        assert_eq!(rx.try_recv().unwrap(), "MOUSE,SCROLL,2,3,4,1");
    }

    #[test]
    fn test_window_query_emits_active_and_all() {
        let (dispatcher, rx) = build(&Config::default(), Arc::new(OneWindow));

        dispatcher.on_event(CapturedEvent::window_query());
        let active = rx.try_recv().unwrap();
        let all = rx.try_recv().unwrap();
        assert!(active.starts_with("WINDOW_INFO,ACTIVE,{\"ownerName\":\"Terminal\""));
        assert!(active.ends_with(",1"));
        assert!(all.starts_with("WINDOW_INFO,ALL,[{"));
        assert!(all.ends_with(",2"));
    }

    #[test]
    fn test_app_activation_follows_with_active_window() {
        let (dispatcher, rx) = build(&Config::default(), Arc::new(OneWindow));

        dispatcher.on_event(CapturedEvent::app_activation("Terminal"));
        assert_eq!(rx.try_recv().unwrap(), "APPLICATION,Terminal,1");
        assert!(rx.try_recv().unwrap().starts_with("WINDOW_INFO,ACTIVE,"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tap_reenable_limit() {
        let config = Config {
            max_tap_reenables: 2,
            ..Config::default()
        };
        let (dispatcher, _rx) = build(&config, Arc::new(NoWindows));

        assert_eq!(
            dispatcher.on_tap_disabled(TapDisableReason::Timeout),
            TapAction::Reenable
        );
        assert_eq!(
            dispatcher.on_tap_disabled(TapDisableReason::UserInput),
            TapAction::Reenable
        );
        assert_eq!(
            dispatcher.on_tap_disabled(TapDisableReason::Timeout),
            TapAction::Terminate
        );
    }
}
