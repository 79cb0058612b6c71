//! Inbound host channel: one `{verdictCode},{respondingSeq}` line per decision.

use crate::arbiter::Arbiter;
use crate::capture::types::Verdict;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// A parsed host response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResponse {
    pub verdict: Verdict,
    pub responding_id: u64,
}

impl HostResponse {
    /// Parse a response line.
    ///
    /// Never fails: a verdict code other than `1` means propagate, and an id
    /// that does not parse becomes 0, which matches no round.
    pub fn parse(line: &str) -> Self {
        let (code, id) = line.trim().split_once(',').unwrap_or((line.trim(), ""));
        Self {
            verdict: Verdict::from(code.trim() == "1"),
            responding_id: id.trim().parse().unwrap_or(0),
        }
    }
}

/// Feed every line from `reader` to the arbiter until EOF.
pub fn run_host_reader<R: BufRead>(reader: R, arbiter: &Arbiter) {
    for line in reader.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => {
                let accepted = arbiter.handle_host_line(&line);
                debug!(line = %line, accepted, "host response");
            }
            Err(e) => {
                warn!("host channel read failed: {e}");
                break;
            }
        }
    }
    info!("host channel closed");
}

/// Run [`run_host_reader`] on its own thread.
pub fn spawn_host_reader<R>(reader: R, arbiter: Arc<Arbiter>) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("host-reader".into())
        .spawn(move || run_host_reader(reader, &arbiter))
}
