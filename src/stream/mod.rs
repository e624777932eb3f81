// src/stream/mod.rs

//! Wiring of a child's standard streams.
//!
//! The orchestrator hands the child's stdin/stdout/stderr to an
//! [`ExecuteStreamHandler`], starts it before waiting for the child, and stops
//! it after the child has exited. Stopping waits for every output pump to
//! drain, so no output produced before exit is lost.
//!
//! - [`PumpStreamHandler`]: pumps output into arbitrary sinks (parent's own
//!   stdout/stderr by default, or the logging callback via [`LineLogWriter`]).
//! - [`FileStreamHandler`]: pumps output into files.
//! - [`SharedBuffer`]: in-memory sink for capturing output.

pub mod buffer;
pub mod file_handler;
pub mod line_writer;
pub mod pump_handler;
pub mod pumper;

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

pub use buffer::SharedBuffer;
pub use file_handler::FileStreamHandler;
pub use line_writer::LineLogWriter;
pub use pump_handler::PumpStreamHandler;
pub use pumper::StreamPumper;

/// Readable end of a child stream (stdout/stderr) or an input source.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;
/// Writable end of a child stream (stdin) or an output destination.
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Receives a child's standard streams and decides where they go.
///
/// The `attach_*` calls happen right after spawn; an error from any of them
/// makes the orchestrator kill the child and fail the run.
pub trait ExecuteStreamHandler: Send {
    fn attach_stdin(&mut self, stdin: ByteSink) -> io::Result<()>;

    fn attach_stdout(&mut self, stdout: ByteSource) -> io::Result<()>;

    fn attach_stderr(&mut self, stderr: ByteSource) -> io::Result<()>;

    /// Begin moving data. Called once, after all streams are attached.
    fn start(&mut self);

    /// Wait for output to be fully drained. Safe to call more than once.
    fn stop(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
