// src/stream/pump_handler.rs

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::logging::LogCallback;
use crate::stream::line_writer::LineLogWriter;
use crate::stream::pumper::StreamPumper;
use crate::stream::{ByteSink, ByteSource, ExecuteStreamHandler};
use crate::types::Severity;

/// How long `stop` waits for end-of-stream before telling the pumps to wrap
/// up, and again before abandoning them.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(500);

struct RunningPump {
    name: &'static str,
    handle: JoinHandle<()>,
    stop: Option<oneshot::Sender<()>>,
    /// Output pumps are joined on stop; the input pump is aborted.
    join: bool,
}

/// Pumps the child's stdout and stderr into two sinks, each on its own task.
///
/// If an input source is supplied it is pumped into the child's stdin, which
/// is then closed; without one, stdin is closed immediately so the child
/// never waits for input.
///
/// Stopping is bounded. A background process the child left behind may keep
/// the pipes open long after the child exited; after the drain grace the
/// pumps copy whatever is still buffered and end, and a pump that still has
/// not finished after a second grace is aborted.
pub struct PumpStreamHandler {
    out: Option<ByteSink>,
    err: Option<ByteSink>,
    input: Option<ByteSource>,
    pending: Vec<StreamPumper>,
    running: Vec<RunningPump>,
    drain_grace: Duration,
}

impl PumpStreamHandler {
    pub fn new(out: ByteSink, err: ByteSink) -> Self {
        Self {
            out: Some(out),
            err: Some(err),
            input: None,
            pending: Vec::new(),
            running: Vec::new(),
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    /// Relay output to this process's own stdout and stderr.
    pub fn inherit() -> Self {
        Self::new(Box::new(tokio::io::stdout()), Box::new(tokio::io::stderr()))
    }

    /// Relay output, line by line, to `callback`.
    pub fn to_log(callback: LogCallback, stdout_level: Severity, stderr_level: Severity) -> Self {
        Self::new(
            Box::new(LineLogWriter::new(callback.clone(), stdout_level)),
            Box::new(LineLogWriter::new(callback, stderr_level)),
        )
    }

    /// Sinks are supplied later via `set_stdout_sink` and `set_stderr_sink`.
    pub(crate) fn deferred() -> Self {
        Self {
            out: None,
            err: None,
            input: None,
            pending: Vec::new(),
            running: Vec::new(),
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub(crate) fn set_stdout_sink(&mut self, sink: ByteSink) {
        self.out = Some(sink);
    }

    pub(crate) fn set_stderr_sink(&mut self, sink: ByteSink) {
        self.err = Some(sink);
    }

    pub fn with_input(mut self, input: ByteSource) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    fn sink_or_discard(sink: Option<ByteSink>) -> ByteSink {
        sink.unwrap_or_else(|| Box::new(tokio::io::sink()))
    }
}

impl ExecuteStreamHandler for PumpStreamHandler {
    fn attach_stdin(&mut self, stdin: ByteSink) -> io::Result<()> {
        match self.input.take() {
            Some(input) => self
                .pending
                .push(StreamPumper::new("stdin", input, stdin).closing_sink()),
            // Dropping our end closes the pipe.
            None => drop(stdin),
        }
        Ok(())
    }

    fn attach_stdout(&mut self, stdout: ByteSource) -> io::Result<()> {
        let sink = Self::sink_or_discard(self.out.take());
        self.pending.push(StreamPumper::new("stdout", stdout, sink));
        Ok(())
    }

    fn attach_stderr(&mut self, stderr: ByteSource) -> io::Result<()> {
        let sink = Self::sink_or_discard(self.err.take());
        self.pending.push(StreamPumper::new("stderr", stderr, sink));
        Ok(())
    }

    fn start(&mut self) {
        for mut pump in self.pending.drain(..) {
            let name = pump.name();
            let stop = pump.stop_signal();
            self.running.push(RunningPump {
                name,
                join: name != "stdin",
                stop: Some(stop),
                handle: pump.spawn(),
            });
        }
    }

    fn stop(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let running: Vec<RunningPump> = self.running.drain(..).collect();
        let grace = self.drain_grace;
        Box::pin(async move {
            let mut outputs = Vec::new();
            for pump in running {
                if pump.join {
                    outputs.push(pump);
                } else {
                    pump.handle.abort();
                }
            }

            let deadline = Instant::now() + grace;
            let mut lingering = Vec::new();
            for mut pump in outputs {
                match timeout_at(deadline, &mut pump.handle).await {
                    Ok(joined) => report(pump.name, joined),
                    Err(_) => lingering.push(pump),
                }
            }
            if lingering.is_empty() {
                return;
            }

            for pump in &mut lingering {
                debug!(stream = pump.name, "stream still open after exit; draining what is buffered");
                if let Some(stop) = pump.stop.take() {
                    let _ = stop.send(());
                }
            }
            let deadline = Instant::now() + grace;
            for mut pump in lingering {
                match timeout_at(deadline, &mut pump.handle).await {
                    Ok(joined) => report(pump.name, joined),
                    Err(_) => {
                        warn!(stream = pump.name, "pump did not finish; abandoning it");
                        pump.handle.abort();
                    }
                }
            }
        })
    }
}

fn report(stream: &'static str, joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => debug!(stream, "pump drained"),
        Err(e) => warn!(stream, error = %e, "pump task failed"),
    }
}
