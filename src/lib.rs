//! input-gate - low-latency input interception with a host-side veto.
//!
//! Every captured keyboard, pointer and modifier event is written to stdout as
//! a comma-separated record tagged with a sequence id. For blocking events
//! (pointer buttons by default) the capture thread waits for the host to
//! answer `{verdict},{seq}` on stdin. If no answer arrives within the decision
//! timeout (30 ms by default) the event is let through.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           input-gate                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │   Capture   │──▶│ Dispatcher  │──▶│   Encoder   │──▶ stdout  │
//! │  │ (event tap) │   │             │   │             │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! │                       │      ▲              ▲                   │
//! │                       ▼      │              │                   │
//! │                    ┌─────────────┐   ┌─────────────┐            │
//! │   stdin ─────────▶ │   Arbiter   │   │  Metadata   │            │
//! │   (host reader)    │ (30ms gate) │   │   Poller    │            │
//! │                    └─────────────┘   └─────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use input_gate::{bridge::Bridge, capture::Capture, config::Config};
//! use input_gate::{metadata::platform_source, sink::LineWriter};
//! use std::io::{self, BufReader};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let sources = config.sources;
//! let output = LineWriter::stdout().expect("output writer");
//! let bridge = Bridge::new(config, Arc::new(output), Arc::from(platform_source()));
//! let threads = bridge.start(BufReader::new(io::stdin())).expect("bridge threads");
//!
//! // Requires Accessibility permission on macOS
//! let mut capture = Capture::new(bridge.handler(), sources);
//! capture.start().expect("Failed to register event tap");
//! # threads.stop();
//! ```

pub mod arbiter;
pub mod bridge;
pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod host;
pub mod metadata;
pub mod sink;
pub mod stats;
pub mod timer;

// Re-export key types at crate root for convenience
pub use arbiter::{Arbiter, DecisionRequest, DEFAULT_DECISION_TIMEOUT};
pub use bridge::{Bridge, BridgeThreads};
pub use capture::{CaptureError, CapturedEvent, EventKind, SubKind, Verdict};
pub use config::{BlockingPolicy, Config, SourceConfig};
pub use dispatcher::{CaptureDispatcher, EventHandler};
pub use encoder::{EncodedRecord, Encoder, SequenceCounter};
pub use host::HostResponse;
pub use metadata::{WindowInfo, WindowSource};
pub use sink::{ChannelSink, Emitter, EventSink, LineWriter};
pub use stats::{BridgeStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_matches_config() {
        assert_eq!(Config::default().decision_timeout, DEFAULT_DECISION_TIMEOUT);
    }
}
