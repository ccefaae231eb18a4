//! IPC Message Types
//!
//! Every type carries `check_bytes` so frames are validated before use.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Worker identity advertised during handshake
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// OS process id of the worker
    pub pid: u32,
    /// Process targets the worker binary has registered
    pub targets: Vec<String>,
}

impl WorkerCapabilities {
    /// Capabilities of the current process
    pub fn current(targets: Vec<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
            targets,
        }
    }

    /// Whether the worker registered `target`
    pub fn supports(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target)
    }
}

/// Commands sent from Supervisor to Worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Execute one run of a registered target
    Invoke {
        /// Position of this run in the batch
        run_index: u32,
        /// Registered target identifier
        target: String,
        /// Encoded argument tuple
        payload: Vec<u8>,
    },

    /// Request graceful shutdown
    Shutdown,
}

/// Messages sent from Worker to Supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake
    Hello(WorkerCapabilities),

    /// The run returned normally
    Completed {
        /// Position of the run in the batch
        run_index: u32,
        /// Wall-clock time measured inside the worker
        elapsed_nanos: u64,
        /// Encoded return value
        payload: Vec<u8>,
    },

    /// The run did not produce a value
    Failed {
        /// Position of the run in the batch
        run_index: u32,
        /// Wall-clock time measured inside the worker
        elapsed_nanos: u64,
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
    },
}

/// Categories of run failures inside a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The timed function panicked
    Panic,
    /// Arguments or return value could not be encoded
    Serialization,
    /// The worker has no target with the requested id
    UnknownTarget,
}
