// src/stream/pumper.rs

//! Background byte copy from one stream to another.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::stream::{ByteSink, ByteSource};

/// Read size per iteration; the pumper never holds more than this in memory.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Once stopped, the pump ends after the source stays silent this long.
pub const STOP_SETTLE: Duration = Duration::from_millis(50);

/// Copies `source` into `sink` until end-of-stream.
///
/// Read errors end the pump quietly. Write errors make the pump discard
/// further data but keep reading, so a child writing into the other end of
/// `source` never stalls on a full pipe.
///
/// A pump with a [stop signal](Self::stop_signal) can also finish without
/// end-of-stream: once signalled it copies what is still readable and ends
/// as soon as the source goes quiet for [`STOP_SETTLE`].
pub struct StreamPumper {
    name: &'static str,
    source: ByteSource,
    sink: ByteSink,
    close_sink: bool,
    chunk_size: usize,
    stop: Option<oneshot::Receiver<()>>,
}

impl StreamPumper {
    pub fn new(name: &'static str, source: ByteSource, sink: ByteSink) -> Self {
        Self {
            name,
            source,
            sink,
            close_sink: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stop: None,
        }
    }

    /// Shut the sink down at end-of-stream (used when the sink is the child's
    /// stdin, so the child sees EOF).
    pub fn closing_sink(mut self) -> Self {
        self.close_sink = true;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sending on (or dropping) the returned sender asks the pump to finish
    /// without waiting for end-of-stream.
    pub fn stop_signal(&mut self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.stop = Some(rx);
        tx
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the pump on its own Tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let mut buf = vec![0u8; self.chunk_size];
        let mut copied: u64 = 0;
        let mut sink_ok = true;
        let mut stop = self.stop.take();
        let mut stopping = false;

        loop {
            let read = if stopping {
                match tokio::time::timeout(STOP_SETTLE, self.source.read(&mut buf)).await {
                    Ok(read) => read,
                    Err(_) => {
                        debug!(stream = self.name, "source quiet after stop; ending pump");
                        break;
                    }
                }
            } else if let Some(signal) = stop.as_mut() {
                tokio::select! {
                    read = self.source.read(&mut buf) => read,
                    _ = signal => {
                        stopping = true;
                        continue;
                    }
                }
            } else {
                self.source.read(&mut buf).await
            };

            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(stream = self.name, error = %e, "read failed; stopping pump");
                    break;
                }
            };

            if sink_ok {
                if let Err(e) = self.sink.write_all(&buf[..n]).await {
                    warn!(stream = self.name, error = %e, "write failed; discarding further output");
                    sink_ok = false;
                    continue;
                }
                copied += n as u64;
            }
        }

        if sink_ok {
            let finished = if self.close_sink {
                self.sink.shutdown().await
            } else {
                self.sink.flush().await
            };
            if let Err(e) = finished {
                debug!(stream = self.name, error = %e, "failed to flush sink");
            }
        }

        trace!(stream = self.name, bytes = copied, "pump finished");
    }
}
