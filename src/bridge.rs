//! Wiring of arbiter, dispatcher and background threads.

use crate::arbiter::Arbiter;
use crate::config::Config;
use crate::dispatcher::{CaptureDispatcher, EventHandler};
use crate::encoder::{Encoder, SequenceCounter};
use crate::host::spawn_host_reader;
use crate::metadata::WindowSource;
use crate::sink::{Emitter, EventSink};
use crate::stats::{BridgeStats, SharedStats};
use crate::timer::{spawn_app_watcher, spawn_window_timer};
use crossbeam_channel::{bounded, Sender};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

/// All components of one bridge session, sharing a sequence counter and sink.
pub struct Bridge {
    config: Config,
    dispatcher: Arc<CaptureDispatcher>,
    arbiter: Arc<Arbiter>,
    windows: Arc<dyn WindowSource>,
    stats: SharedStats,
}

impl Bridge {
    pub fn new(config: Config, sink: Arc<dyn EventSink>, windows: Arc<dyn WindowSource>) -> Self {
        let stats: SharedStats = Arc::new(BridgeStats::new());
        let emitter = Arc::new(Emitter::new(
            Encoder::new(Arc::new(SequenceCounter::new())),
            sink,
            stats.clone(),
        ));
        let arbiter = Arc::new(Arbiter::new(
            config.decision_timeout,
            emitter.clone(),
            stats.clone(),
        ));
        let dispatcher = Arc::new(CaptureDispatcher::new(
            &config,
            emitter,
            arbiter.clone(),
            windows.clone(),
            stats.clone(),
        ));

        Self {
            config,
            dispatcher,
            arbiter,
            windows,
            stats,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The handler to install in the OS capture.
    pub fn handler(&self) -> Arc<dyn EventHandler> {
        self.dispatcher.clone()
    }

    pub fn dispatcher(&self) -> &Arc<CaptureDispatcher> {
        &self.dispatcher
    }

    pub fn arbiter(&self) -> &Arc<Arbiter> {
        &self.arbiter
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Start the timeout, host-reader and timer threads and emit the initial
    /// window state.
    pub fn start<R>(&self, host_input: R) -> io::Result<BridgeThreads>
    where
        R: BufRead + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let timeout = self.arbiter.spawn_timeout_thread()?;
        let host_reader = spawn_host_reader(host_input, self.arbiter.clone())?;
        let window_timer = spawn_window_timer(
            self.handler(),
            self.config.window_poll_interval,
            shutdown_rx.clone(),
        )?;
        let app_watcher = spawn_app_watcher(
            self.handler(),
            self.windows.clone(),
            self.config.app_poll_interval,
            shutdown_rx,
        )?;

        self.dispatcher.emit_window_info();
        info!(
            timeout_ms = self.config.decision_timeout.as_millis() as u64,
            window_interval_s = self.config.window_poll_interval.as_secs(),
            "bridge started"
        );

        Ok(BridgeThreads {
            shutdown: Some(shutdown_tx),
            arbiter: self.arbiter.clone(),
            timeout: Some(timeout),
            host_reader,
            timers: vec![window_timer, app_watcher],
        })
    }
}

/// Handles to the threads started by [`Bridge::start`].
pub struct BridgeThreads {
    shutdown: Option<Sender<()>>,
    arbiter: Arc<Arbiter>,
    timeout: Option<JoinHandle<()>>,
    host_reader: JoinHandle<()>,
    timers: Vec<JoinHandle<()>>,
}

impl BridgeThreads {
    /// Whether the host closed its side of the inbound channel.
    pub fn host_closed(&self) -> bool {
        self.host_reader.is_finished()
    }

    /// Stop and join the timer and timeout threads.
    ///
    /// The host reader is left alone: it may be blocked in a read that only
    /// the host can end, and process exit reclaims it.
    pub fn stop(mut self) {
        self.shutdown.take();
        self.arbiter.shutdown();
        for handle in self.timers.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.timeout.take() {
            let _ = handle.join();
        }
        debug!("bridge threads stopped");
    }
}
