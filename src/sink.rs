//! Outbound line channel to the host.
//!
//! Lines reach the sink through an [`Emitter`], which stamps and writes them
//! under one lock so the host always reads `seq` in increasing order.

use crate::encoder::{EncodedRecord, Encoder};
use crate::stats::SharedStats;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, warn};

/// Lines the stdout writer may hold before new lines are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Destination for encoded lines.
///
/// `emit` is called from the capture thread and must not block: lines are
/// queued in call order and written elsewhere.
pub trait EventSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Hands lines to a writer thread over a bounded queue.
///
/// When the host stops reading and the queue fills, lines are dropped rather
/// than stalling input. A decision line dropped this way times out and the
/// event propagates.
pub struct LineWriter {
    queue: Sender<String>,
    dropped: AtomicU64,
}

impl LineWriter {
    /// Start a writer thread that writes and flushes each line to `out`.
    pub fn spawn<W>(mut out: W, capacity: usize) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (queue, lines) = bounded::<String>(capacity);
        thread::Builder::new()
            .name("line-writer".into())
            .spawn(move || {
                for line in lines {
                    let result = writeln!(out, "{line}").and_then(|()| out.flush());
                    if let Err(e) = result {
                        warn!("failed to write to host channel: {e}");
                        break;
                    }
                }
                debug!("line writer stopped");
            })?;

        Ok(Self {
            queue,
            dropped: AtomicU64::new(0),
        })
    }

    pub fn stdout() -> io::Result<Self> {
        Self::spawn(io::stdout(), DEFAULT_QUEUE_CAPACITY)
    }

    /// Lines discarded because the queue was full or the writer had stopped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for LineWriter {
    fn emit(&self, line: &str) {
        match self.queue.try_send(line.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("host is not reading output, dropping lines");
                }
            }
        }
    }
}

/// Sends lines over a crossbeam channel. Used where no process boundary exists.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes its lines.
    pub fn channel() -> (Self, Receiver<String>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, line: &str) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.sender.send(line.to_string());
    }
}

/// Owns the encoder and the sink. Ids are allocated and lines written while
/// holding one lock.
pub struct Emitter {
    encoder: Mutex<Encoder>,
    sink: Arc<dyn EventSink>,
    stats: SharedStats,
}

impl Emitter {
    pub fn new(encoder: Encoder, sink: Arc<dyn EventSink>, stats: SharedStats) -> Self {
        Self {
            encoder: Mutex::new(encoder),
            sink,
            stats,
        }
    }

    /// Take the output lock. Nothing else can be stamped or written until the
    /// guard is dropped.
    pub fn begin(&self) -> EmitGuard<'_> {
        EmitGuard {
            encoder: self.encoder.lock().unwrap_or_else(PoisonError::into_inner),
            emitter: self,
        }
    }

    /// Encode with `produce` and write the result in one critical section.
    pub fn emit<F>(&self, produce: F) -> Vec<EncodedRecord>
    where
        F: FnOnce(&Encoder) -> Vec<EncodedRecord>,
    {
        let out = self.begin();
        let records = produce(out.encoder());
        out.write(&records);
        records
    }
}

/// Exclusive access to the output stream.
pub struct EmitGuard<'a> {
    encoder: MutexGuard<'a, Encoder>,
    emitter: &'a Emitter,
}

impl EmitGuard<'_> {
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn write(&self, records: &[EncodedRecord]) {
        for record in records {
            self.emitter.sink.emit(&record.line);
            self.emitter.stats.record_emitted();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::CapturedEvent;
    use crate::encoder::SequenceCounter;
    use crate::stats::BridgeStats;
    use std::time::{Duration, Instant};

    /// A `Write` whose contents the test can read while the writer thread
    /// still owns it.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A `Write` that never returns, like a pipe nobody reads.
    struct Stuck;

    impl Write for Stuck {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            loop {
                thread::park();
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_writer_terminates_lines() {
        let buf = SharedBuf::default();
        let writer = LineWriter::spawn(buf.clone(), 16).unwrap();
        writer.emit("MOUSE,MOVE,1,2,1");
        writer.emit("MOUSE,MOVE,3,4,2");

        let expected = "MOUSE,MOVE,1,2,1\nMOUSE,MOVE,3,4,2\n";
        let start = Instant::now();
        while buf.0.lock().unwrap().len() < expected.len() {
            assert!(start.elapsed() < Duration::from_secs(2));
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(), expected);
    }

    #[test]
    fn test_line_writer_never_blocks_on_stalled_output() {
        let writer = LineWriter::spawn(Stuck, 4).unwrap();

        let start = Instant::now();
        for i in 0..100 {
            writer.emit(&format!("MOUSE,MOVE,0,0,{i}"));
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        // One line is stuck in the writer, four wait in the queue.
        assert!(writer.dropped() >= 95);
    }

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, rx) = ChannelSink::channel();
        sink.emit("a");
        sink.emit("b");
        assert_eq!(rx.try_recv().unwrap(), "a");
        assert_eq!(rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn test_emitter_keeps_sequence_order_across_threads() {
        let (sink, rx) = ChannelSink::channel();
        let stats = Arc::new(BridgeStats::new());
        let emitter = Arc::new(Emitter::new(
            Encoder::new(Arc::new(SequenceCounter::new())),
            Arc::new(sink),
            stats.clone(),
        ));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let emitter = emitter.clone();
                thread::spawn(move || {
                    for _ in 0..2000 {
                        emitter.emit(|enc| enc.encode(&CapturedEvent::pointer_move((0.0, 0.0))));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let seqs: Vec<u64> = rx
            .try_iter()
            .map(|line| line.rsplit(',').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(seqs, (1..=8000).collect::<Vec<u64>>());
        assert_eq!(stats.snapshot().records_emitted, 8000);
    }
}
