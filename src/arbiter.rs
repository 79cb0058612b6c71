//! Decision arbiter: one suppress/propagate round at a time, bounded by a
//! hard deadline.
//!
//! Three threads meet here:
//!
//! - the capture thread calls [`Arbiter::request_decision`] and blocks;
//! - the host reader calls [`Arbiter::resolve_from_host`] for each response;
//! - the timeout thread ([`Arbiter::run_timeout_loop`]) closes rounds the host
//!   did not answer in time.
//!
//! All of them go through one mutex. A round is identified by the sequence id
//! of the last line emitted for its event, and both resolution paths record
//! the id they closed (`last_response_id`, `last_timeout_id`). A path may only
//! close the round if neither has reached that id yet, so whichever takes the
//! lock first wins and the other becomes a no-op. Any ambiguity resolves to
//! [`Verdict::Propagate`].

use crate::capture::types::{CapturedEvent, Verdict};
use crate::host::HostResponse;
use crate::sink::Emitter;
use crate::stats::SharedStats;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default time the host has to answer a decision request.
pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_millis(30);

/// Extra time the capture thread waits for the timeout thread before closing
/// the round itself.
const BACKSTOP_GRACE: Duration = Duration::from_millis(10);

/// The currently open decision round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionRequest {
    pub sequence_id: u64,
    pub deadline: Instant,
}

#[derive(Debug, Default)]
struct ArbiterState {
    /// Id of the latest round closed by the deadline
    last_timeout_id: u64,
    /// Id of the latest round closed by the host
    last_response_id: u64,
    pending: Option<DecisionRequest>,
    /// Resolution of the pending round, once known
    verdict: Option<Verdict>,
    /// Number of rounds armed so far; the timeout thread's wake-up signal
    armed_rounds: u64,
    shutdown: bool,
}

/// Races host responses against a fixed deadline.
pub struct Arbiter {
    state: Mutex<ArbiterState>,
    response_ready: Condvar,
    timeout_armed: Condvar,
    timeout: Duration,
    emitter: Arc<Emitter>,
    stats: SharedStats,
}

impl Arbiter {
    pub fn new(timeout: Duration, emitter: Arc<Emitter>, stats: SharedStats) -> Self {
        Self {
            state: Mutex::new(ArbiterState::default()),
            response_ready: Condvar::new(),
            timeout_armed: Condvar::new(),
            timeout,
            emitter,
            stats,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The round currently waiting for a verdict.
    pub fn pending_request(&self) -> Option<DecisionRequest> {
        self.lock().pending
    }

    /// Emit `event` to the host and block until the round is resolved.
    ///
    /// Returns within the decision timeout plus scheduling slack, whatever
    /// the host does. Must only be called from the capture thread.
    pub fn request_decision(&self, event: &CapturedEvent) -> Verdict {
        // Ids are allocated, the round registered and the lines written under
        // the output lock, so the host never sees the id before the round
        // exists and no other line can overtake these.
        let out = self.emitter.begin();
        let records = out.encoder().encode(event);
        let Some(id) = records.last().map(|record| record.seq) else {
            return Verdict::Propagate;
        };

        self.stats.record_decision_requested();
        let deadline = Instant::now() + self.timeout;
        {
            let mut state = self.lock();
            state.pending = Some(DecisionRequest {
                sequence_id: id,
                deadline,
            });
            state.verdict = None;
            state.armed_rounds += 1;
        }
        self.timeout_armed.notify_one();
        out.write(&records);
        drop(out);

        let backstop = deadline + BACKSTOP_GRACE;
        let mut state = self.lock();
        let verdict = loop {
            if let Some(verdict) = state.verdict {
                break verdict;
            }
            let now = Instant::now();
            if now >= backstop {
                warn!(seq = id, "timeout thread missed the deadline, failing open");
                state.last_timeout_id = state.last_timeout_id.max(id);
                self.stats.record_timed_out();
                break Verdict::Propagate;
            }
            state = self
                .response_ready
                .wait_timeout(state, backstop - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        };
        state.pending = None;
        state.verdict = None;
        drop(state);

        if verdict.is_suppress() {
            self.stats.record_suppressed();
        }
        trace!(seq = id, ?verdict, "decision round closed");
        verdict
    }

    /// Apply a host response. Returns whether it closed the open round.
    pub fn resolve_from_host(&self, response: HostResponse) -> bool {
        let id = response.responding_id;
        let mut state = self.lock();
        let live = state.pending.map(|request| request.sequence_id) == Some(id);
        let accepted = live && state.last_timeout_id < id && state.last_response_id < id;

        if accepted {
            state.verdict = Some(response.verdict);
            state.last_response_id = id;
            self.stats.record_host_resolved();
            drop(state);
            self.response_ready.notify_one();
        } else {
            drop(state);
            self.stats.record_dropped_response();
            debug!(seq = id, "dropping host response for a closed or unknown round");
        }
        accepted
    }

    /// Parse and apply one inbound line.
    pub fn handle_host_line(&self, line: &str) -> bool {
        self.resolve_from_host(HostResponse::parse(line))
    }

    /// Body of the timeout thread. Returns after [`Arbiter::shutdown`].
    pub fn run_timeout_loop(&self) {
        let mut seen_rounds = 0;
        loop {
            let Some(request) = self.wait_for_armed_round(&mut seen_rounds) else {
                return;
            };
            thread::sleep(request.deadline.saturating_duration_since(Instant::now()));
            self.expire(request.sequence_id);
        }
    }

    /// Start the timeout thread.
    pub fn spawn_timeout_thread(self: &Arc<Self>) -> io::Result<JoinHandle<()>> {
        let arbiter = Arc::clone(self);
        thread::Builder::new()
            .name("arbiter-timeout".into())
            .spawn(move || arbiter.run_timeout_loop())
    }

    /// Stop the timeout thread. Rounds opened afterwards are closed by the
    /// capture thread's own backstop.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.timeout_armed.notify_all();
    }

    fn wait_for_armed_round(&self, seen_rounds: &mut u64) -> Option<DecisionRequest> {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if state.armed_rounds > *seen_rounds {
                *seen_rounds = state.armed_rounds;
                if let Some(request) = state.pending {
                    return Some(request);
                }
                // Already closed before we got here.
                continue;
            }
            state = self
                .timeout_armed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn expire(&self, id: u64) {
        let mut state = self.lock();
        let live = state.pending.map(|request| request.sequence_id) == Some(id);
        if !live || state.last_response_id >= id || state.last_timeout_id >= id {
            return;
        }
        state.verdict = Some(Verdict::Propagate);
        state.last_timeout_id = id;
        self.stats.record_timed_out();
        drop(state);

        self.response_ready.notify_one();
        debug!(seq = id, "host did not answer in time, propagating");
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::SubKind;
    use crate::encoder::{Encoder, SequenceCounter};
    use crate::sink::ChannelSink;
    use crate::stats::BridgeStats;
    use crossbeam_channel::Receiver;

    const TIMEOUT: Duration = Duration::from_millis(30);
    const SLACK: Duration = Duration::from_millis(100);

    fn unstarted() -> (Arc<Arbiter>, Receiver<String>, SharedStats) {
        let (sink, rx) = ChannelSink::channel();
        let stats = Arc::new(BridgeStats::new());
        let emitter = Arc::new(Emitter::new(
            Encoder::new(Arc::new(SequenceCounter::new())),
            Arc::new(sink),
            stats.clone(),
        ));
        let arbiter = Arc::new(Arbiter::new(TIMEOUT, emitter, stats.clone()));
        (arbiter, rx, stats)
    }

    fn arbiter() -> (Arc<Arbiter>, Receiver<String>, SharedStats) {
        let (arbiter, rx, stats) = unstarted();
        arbiter.spawn_timeout_thread().unwrap();
        (arbiter, rx, stats)
    }

    fn click() -> CapturedEvent {
        CapturedEvent::pointer_button(SubKind::Down, 0, (5.0, 5.0))
    }

    fn seq_of(line: &str) -> u64 {
        line.rsplit(',').next().unwrap().parse().unwrap()
    }

    #[test]
    fn test_silent_host_times_out_to_propagate() {
        let (arbiter, rx, stats) = arbiter();

        let start = Instant::now();
        let verdict = arbiter.request_decision(&click());
        let elapsed = start.elapsed();

        assert_eq!(verdict, Verdict::Propagate);
        assert!(elapsed >= TIMEOUT);
        assert!(elapsed < TIMEOUT + SLACK, "took {elapsed:?}");
        assert_eq!(rx.try_recv().unwrap(), "MOUSE,DOWN,0,5,5,1");
        assert_eq!(stats.snapshot().timed_out, 1);
        assert!(arbiter.pending_request().is_none());
        arbiter.shutdown();
    }

    #[test]
    fn test_host_suppress_closes_round_early() {
        let (arbiter, rx, stats) = arbiter();

        let responder = {
            let arbiter = arbiter.clone();
            thread::spawn(move || {
                let line = rx.recv().unwrap();
                arbiter.handle_host_line(&format!("1,{}", seq_of(&line)))
            })
        };

        let start = Instant::now();
        assert_eq!(arbiter.request_decision(&click()), Verdict::Suppress);
        assert!(start.elapsed() < TIMEOUT + SLACK);
        assert!(responder.join().unwrap());

        let snap = stats.snapshot();
        assert_eq!(snap.host_resolved, 1);
        assert_eq!(snap.suppressed, 1);
        arbiter.shutdown();
    }

    #[test]
    fn test_stale_response_does_not_close_next_round() {
        let (arbiter, _rx, stats) = arbiter();

        assert_eq!(arbiter.request_decision(&click()), Verdict::Propagate);
        // Late answer for round 1 after it timed out.
        assert!(!arbiter.handle_host_line("1,1"));

        let late = {
            let arbiter = arbiter.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                arbiter.handle_host_line("1,1")
            })
        };
        assert_eq!(arbiter.request_decision(&click()), Verdict::Propagate);
        assert!(!late.join().unwrap());

        let snap = stats.snapshot();
        assert_eq!(snap.timed_out, 2);
        assert_eq!(snap.suppressed, 0);
        assert_eq!(snap.dropped_responses, 2);
        arbiter.shutdown();
    }

    #[test]
    fn test_malformed_line_is_dropped() {
        let (arbiter, _rx, _stats) = arbiter();
        assert!(!arbiter.handle_host_line("garbage"));
        assert!(!arbiter.handle_host_line(""));
        arbiter.shutdown();
    }

    #[test]
    fn test_backstop_without_timeout_thread() {
        let (arbiter, _rx, _stats) = unstarted();

        let start = Instant::now();
        assert_eq!(arbiter.request_decision(&click()), Verdict::Propagate);
        assert!(start.elapsed() < TIMEOUT + BACKSTOP_GRACE + SLACK);
    }
}
