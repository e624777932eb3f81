// src/stream/file_handler.rs

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::debug;

use crate::stream::pump_handler::PumpStreamHandler;
use crate::stream::{ByteSink, ByteSource, ExecuteStreamHandler};

/// Pumps the child's output into files.
///
/// Relative file names are resolved against `dir`. Files are opened when the
/// streams are attached, so an uncreatable file fails the run right after
/// spawn. When no separate error file is given, both streams share one
/// append-mode handle on the output file, so neither overwrites the other.
pub struct FileStreamHandler {
    dir: PathBuf,
    output: PathBuf,
    error: Option<PathBuf>,
    append: bool,
    shared: Option<File>,
    inner: PumpStreamHandler,
}

impl FileStreamHandler {
    pub fn new(dir: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            output: output.into(),
            error: None,
            append: false,
            shared: None,
            inner: PumpStreamHandler::deferred(),
        }
    }

    pub fn with_error_file(mut self, error: impl Into<PathBuf>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Append to existing files instead of truncating them.
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn with_input(mut self, input: ByteSource) -> Self {
        self.inner = self.inner.with_input(input);
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(&self.output)
    }

    pub fn error_path(&self) -> PathBuf {
        self.dir.join(self.error.as_ref().unwrap_or(&self.output))
    }

    /// Writes always land at the end of the file; `append == false` only
    /// empties it first.
    fn open(path: &Path, append: bool) -> io::Result<File> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if !append {
            file.set_len(0)?;
        }
        debug!(path = ?path, append, "opened output file");
        Ok(file)
    }

    fn sink(file: File) -> ByteSink {
        Box::new(tokio::fs::File::from_std(file))
    }
}

impl ExecuteStreamHandler for FileStreamHandler {
    fn attach_stdin(&mut self, stdin: ByteSink) -> io::Result<()> {
        self.inner.attach_stdin(stdin)
    }

    fn attach_stdout(&mut self, stdout: ByteSource) -> io::Result<()> {
        let file = Self::open(&self.output_path(), self.append)?;
        if self.error.is_none() {
            self.shared = Some(file.try_clone()?);
        }
        self.inner.set_stdout_sink(Self::sink(file));
        self.inner.attach_stdout(stdout)
    }

    fn attach_stderr(&mut self, stderr: ByteSource) -> io::Result<()> {
        let file = match (&self.error, self.shared.take()) {
            (None, Some(shared)) => shared,
            // stdout was never attached, so nothing has emptied the file yet.
            (None, None) => Self::open(&self.output_path(), self.append)?,
            (Some(_), _) => Self::open(&self.error_path(), self.append)?,
        };
        self.inner.set_stderr_sink(Self::sink(file));
        self.inner.attach_stderr(stderr)
    }

    fn start(&mut self) {
        self.inner.start();
    }

    fn stop(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.inner.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_streams_to_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = FileStreamHandler::new(dir.path(), "out.log").with_error_file("err.log");

        handler.attach_stdout(Box::new(&b"out\n"[..])).unwrap();
        handler.attach_stderr(Box::new(&b"err\n"[..])).unwrap();
        handler.start();
        handler.stop().await;

        assert_eq!(std::fs::read_to_string(dir.path().join("out.log")).unwrap(), "out\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("err.log")).unwrap(), "err\n");
    }

    #[tokio::test]
    async fn append_keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.log"), "old\n").unwrap();

        let mut handler = FileStreamHandler::new(dir.path(), "out.log")
            .with_error_file("err.log")
            .append(true);
        handler.attach_stdout(Box::new(&b"new\n"[..])).unwrap();
        handler.attach_stderr(Box::new(&b""[..])).unwrap();
        handler.start();
        handler.stop().await;

        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.log")).unwrap(),
            "old\nnew\n"
        );
    }

    #[tokio::test]
    async fn truncates_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.log"), "stale contents\n").unwrap();

        let mut handler = FileStreamHandler::new(dir.path(), "out.log");
        handler.attach_stdout(Box::new(&b"fresh\n"[..])).unwrap();
        handler.attach_stderr(Box::new(&b""[..])).unwrap();
        handler.start();
        handler.stop().await;

        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.log")).unwrap(),
            "fresh\n"
        );
    }

    #[tokio::test]
    async fn shared_file_keeps_both_streams() {
        use tokio::io::AsyncWriteExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.log"), "stale contents\n").unwrap();
        let (mut out_writer, out_reader) = tokio::io::duplex(64);
        let (mut err_writer, err_reader) = tokio::io::duplex(64);

        let mut handler = FileStreamHandler::new(dir.path(), "out.log");
        handler.attach_stdout(Box::new(out_reader)).unwrap();
        handler.attach_stderr(Box::new(err_reader)).unwrap();
        handler.start();

        err_writer.write_all(b"ERRLINE\n").await.unwrap();
        drop(err_writer);
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        out_writer.write_all(b"OUTLINE\n").await.unwrap();
        drop(out_writer);
        handler.stop().await;

        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.log")).unwrap(),
            "ERRLINE\nOUTLINE\n"
        );
    }

    #[test]
    fn uncreatable_file_fails_attach() {
        let mut handler = FileStreamHandler::new("/nonexistent/procrun/dir", "out.log");
        assert!(handler.attach_stdout(Box::new(&b""[..])).is_err());
    }
}
