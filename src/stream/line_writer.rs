// src/stream/line_writer.rs

//! Sink that turns a byte stream into log lines.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use crate::logging::LogCallback;
use crate::types::Severity;

/// Buffers bytes until a line terminator and forwards each complete line to a
/// [`LogCallback`] at a fixed severity.
///
/// `\n`, `\r` and `\r\n` all end a line. A trailing partial line is emitted on
/// shutdown or drop.
pub struct LineLogWriter {
    callback: LogCallback,
    severity: Severity,
    line: Vec<u8>,
    after_cr: bool,
}

impl LineLogWriter {
    pub fn new(callback: LogCallback, severity: Severity) -> Self {
        Self {
            callback,
            severity,
            line: Vec::new(),
            after_cr: false,
        }
    }

    fn push(&mut self, buf: &[u8]) {
        for &b in buf {
            match b {
                b'\n' if self.after_cr => {}
                b'\n' | b'\r' => self.emit(),
                _ => self.line.push(b),
            }
            self.after_cr = b == b'\r';
        }
    }

    fn emit(&mut self) {
        {
            let text = String::from_utf8_lossy(&self.line);
            (self.callback)(self.severity, &text);
        }
        self.line.clear();
    }

    fn emit_partial(&mut self) {
        if !self.line.is_empty() {
            self.emit();
        }
    }
}

impl AsyncWrite for LineLogWriter {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.push(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.emit_partial();
        Poll::Ready(Ok(()))
    }
}

impl Drop for LineLogWriter {
    fn drop(&mut self) {
        self.emit_partial();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::AsyncWriteExt;

    use super::*;

    fn recorder() -> (LogCallback, Arc<Mutex<Vec<(Severity, String)>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let cb: LogCallback = Arc::new(move |sev, msg: &str| {
            sink.lock().unwrap().push((sev, msg.to_string()));
        });
        (cb, lines)
    }

    #[tokio::test]
    async fn splits_on_all_line_terminators() {
        let (cb, lines) = recorder();
        let mut w = LineLogWriter::new(cb, Severity::Warn);
        w.write_all(b"one\ntwo\r\nthree\rfour").await.unwrap();

        assert_eq!(
            lines.lock().unwrap().iter().map(|(_, l)| l.as_str()).collect::<Vec<_>>(),
            vec!["one", "two", "three"]
        );

        drop(w);
        let lines = lines.lock().unwrap();
        assert_eq!(lines.last().unwrap(), &(Severity::Warn, "four".to_string()));
    }

    #[tokio::test]
    async fn lines_split_across_writes_are_joined() {
        let (cb, lines) = recorder();
        let mut w = LineLogWriter::new(cb, Severity::Info);
        w.write_all(b"hel").await.unwrap();
        w.write_all(b"lo\r").await.unwrap();
        w.write_all(b"\nworld\n").await.unwrap();
        w.shutdown().await.unwrap();

        let got: Vec<String> = lines.lock().unwrap().iter().map(|(_, l)| l.clone()).collect();
        assert_eq!(got, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn blank_lines_are_forwarded() {
        let (cb, lines) = recorder();
        let mut w = LineLogWriter::new(cb, Severity::Info);
        w.write_all(b"a\n\nb\n").await.unwrap();
        drop(w);

        let got: Vec<String> = lines.lock().unwrap().iter().map(|(_, l)| l.clone()).collect();
        assert_eq!(got, vec!["a", "", "b"]);
    }
}
