use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use procrun::stream::{
    ByteSink, ByteSource, ExecuteStreamHandler, PumpStreamHandler, SharedBuffer,
};

/// Stream handler that records every call it receives and captures output.
///
/// Optionally fails one `attach_*` call, to exercise wiring failures.
pub struct RecordingStreamHandler {
    calls: Arc<Mutex<Vec<&'static str>>>,
    fail_on: Option<&'static str>,
    inner: PumpStreamHandler,
    out: SharedBuffer,
    err: SharedBuffer,
}

impl RecordingStreamHandler {
    pub fn new() -> Self {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        Self {
            calls: Arc::default(),
            fail_on: None,
            inner: PumpStreamHandler::new(Box::new(out.clone()), Box::new(err.clone())),
            out,
            err,
        }
    }

    /// Fail the given attach call: `"stdin"`, `"stdout"` or `"stderr"`.
    pub fn failing_on(mut self, stream: &'static str) -> Self {
        self.fail_on = Some(stream);
        self
    }

    /// Shared view of the recorded calls.
    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }

    pub fn stdout(&self) -> SharedBuffer {
        self.out.clone()
    }

    pub fn stderr(&self) -> SharedBuffer {
        self.err.clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, stream: &'static str) -> io::Result<()> {
        if self.fail_on == Some(stream) {
            return Err(io::Error::other(format!("refusing to attach {stream}")));
        }
        Ok(())
    }
}

impl Default for RecordingStreamHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecuteStreamHandler for RecordingStreamHandler {
    fn attach_stdin(&mut self, stdin: ByteSink) -> io::Result<()> {
        self.record("attach_stdin");
        self.check("stdin")?;
        self.inner.attach_stdin(stdin)
    }

    fn attach_stdout(&mut self, stdout: ByteSource) -> io::Result<()> {
        self.record("attach_stdout");
        self.check("stdout")?;
        self.inner.attach_stdout(stdout)
    }

    fn attach_stderr(&mut self, stderr: ByteSource) -> io::Result<()> {
        self.record("attach_stderr");
        self.check("stderr")?;
        self.inner.attach_stderr(stderr)
    }

    fn start(&mut self) {
        self.record("start");
        self.inner.start();
    }

    fn stop(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.record("stop");
        self.inner.stop()
    }
}
