#![warn(missing_docs)]
//! timeit IPC Protocol
//!
//! Wire protocol between a timing supervisor and its worker processes.
//! Messages are rkyv archives behind a 4-byte length prefix; argument and
//! result payloads travel as opaque bytes encoded by the caller.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE};
pub use messages::{FailureKind, SupervisorCommand, WorkerCapabilities, WorkerMessage};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the worker's pipe descriptors as
/// `<read_fd>,<write_fd>`
pub const IPC_FD_ENV: &str = "TIMEIT_IPC_FD";

/// Descriptor the supervisor maps the command pipe onto in the child
pub const WORKER_COMMAND_FD: i32 = 3;

/// Descriptor the supervisor maps the message pipe onto in the child
pub const WORKER_MESSAGE_FD: i32 = 4;
