//! Worker Process Entry Point
//!
//! A worker is the host executable re-executed by the supervisor with
//! `TIMEIT_IPC_FD=<read>,<write>` set and the pipes mapped onto those
//! descriptors. It answers `Invoke` commands from the registry until told to
//! shut down, its pipe closes, or it receives SIGTERM.

use super::registry::find_target;
use crate::measure::{MonotonicClock, Timer};
use crate::runner::panic_message;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use timeit_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, SupervisorCommand,
    WorkerCapabilities, WorkerMessage,
};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Set by the SIGTERM handler
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// The handler only stores an atomic, which is async-signal-safe.
#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

/// Whether this process was started as a timing worker.
///
/// Decorated functions called inside a worker run untimed, so a worker never
/// spawns workers of its own.
pub fn is_worker_process() -> bool {
    std::env::var_os(IPC_FD_ENV).is_some()
}

/// Serve as a worker and exit, if this process was started as one.
///
/// Must run at the top of `main` in any binary that uses the processes
/// substrate, before argument parsing or other side effects. Returns
/// immediately in a normal process.
pub fn run_worker_if_requested() {
    if !is_worker_process() {
        return;
    }

    let code = match serve() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("timeit: worker {} failed: {e}", std::process::id());
            1
        }
    };
    std::process::exit(code);
}

#[cfg(unix)]
fn serve() -> Result<(), FrameError> {
    let (read_fd, write_fd) = parse_fds().ok_or_else(|| {
        FrameError::Malformed(format!(
            "invalid {IPC_FD_ENV} (expected format: <read_fd>,<write_fd>)"
        ))
    })?;
    install_sigterm_handler();

    // SAFETY: the supervisor mapped both pipe ends onto these descriptors
    // before exec; nothing else in this process owns them.
    let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
    let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
    WorkerMain {
        reader: FrameReader::new(read_file),
        writer: FrameWriter::new(write_file),
    }
    .run()
}

#[cfg(not(unix))]
fn serve() -> Result<(), FrameError> {
    Err(FrameError::Malformed(
        "worker processes are only supported on unix".to_string(),
    ))
}

#[cfg(unix)]
fn parse_fds() -> Option<(i32, i32)> {
    let value = std::env::var(IPC_FD_ENV).ok()?;
    let (read, write) = value.split_once(',')?;
    Some((read.trim().parse().ok()?, write.trim().parse().ok()?))
}

struct WorkerMain<R: std::io::Read, W: std::io::Write> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl<R: std::io::Read, W: std::io::Write> WorkerMain<R, W> {
    fn run(&mut self) -> Result<(), FrameError> {
        let targets = super::registry::registered_targets()
            .into_iter()
            .map(|target| target.id.to_string())
            .collect();
        self.writer
            .write(&WorkerMessage::Hello(WorkerCapabilities::current(targets)))?;

        loop {
            if shutdown_requested() {
                break;
            }

            let command: SupervisorCommand = match self.reader.read() {
                Ok(command) => command,
                // Supervisor went away
                Err(FrameError::Closed) => break,
                Err(e) => return Err(e),
            };

            match command {
                SupervisorCommand::Invoke {
                    run_index,
                    target,
                    payload,
                } => {
                    let reply = execute(run_index, &target, &payload);
                    self.writer.write(&reply)?;
                }
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(())
    }
}

/// Run one invocation and build the reply
fn execute(run_index: u32, target: &str, payload: &[u8]) -> WorkerMessage {
    let Some(entry) = find_target(target) else {
        return WorkerMessage::Failed {
            run_index,
            elapsed_nanos: 0,
            kind: FailureKind::UnknownTarget,
            message: format!("no process function registered as `{target}`"),
        };
    };

    let clock = MonotonicClock::new();
    let timer = Timer::start(&clock);
    let result = catch_unwind(AssertUnwindSafe(|| (entry.invoke)(payload)));
    let elapsed_nanos = u64::try_from(timer.stop().as_nanos()).unwrap_or(u64::MAX);

    match result {
        Ok(Ok(payload)) => WorkerMessage::Completed {
            run_index,
            elapsed_nanos,
            payload,
        },
        Ok(Err(e)) => WorkerMessage::Failed {
            run_index,
            elapsed_nanos,
            kind: FailureKind::Serialization,
            message: e.to_string(),
        },
        Err(panic) => WorkerMessage::Failed {
            run_index,
            elapsed_nanos,
            kind: FailureKind::Panic,
            message: panic_message(panic.as_ref()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn double(n: u32) -> u32 {
        n * 2
    }

    fn explode(_: ()) -> u32 {
        panic!("worker-side panic")
    }

    crate::process_fn! {
        static DOUBLE: fn(u32) -> u32 = double;
    }

    crate::process_fn! {
        static EXPLODE: fn(()) -> u32 = explode;
    }

    #[test]
    fn test_execute_outcomes() {
        match execute(0, DOUBLE.id(), b"21") {
            WorkerMessage::Completed { payload, .. } => assert_eq!(payload, b"42"),
            other => panic!("unexpected: {other:?}"),
        }
        match execute(1, EXPLODE.id(), b"null") {
            WorkerMessage::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::Panic);
                assert_eq!(message, "worker-side panic");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match execute(2, "missing::TARGET", b"null") {
            WorkerMessage::Failed { kind, .. } => assert_eq!(kind, FailureKind::UnknownTarget),
            other => panic!("unexpected: {other:?}"),
        }
        match execute(3, DOUBLE.id(), b"\"x\"") {
            WorkerMessage::Failed { kind, .. } => assert_eq!(kind, FailureKind::Serialization),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_worker_loop_over_buffers() {
        let mut commands = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut commands);
            writer
                .write(&SupervisorCommand::Invoke {
                    run_index: 4,
                    target: DOUBLE.id().to_string(),
                    payload: b"5".to_vec(),
                })
                .unwrap();
            writer.write(&SupervisorCommand::Shutdown).unwrap();
        }

        let mut replies = Vec::new();
        WorkerMain {
            reader: FrameReader::new(Cursor::new(commands)),
            writer: FrameWriter::new(&mut replies),
        }
        .run()
        .unwrap();

        let mut reader = FrameReader::new(Cursor::new(replies));
        match reader.read::<WorkerMessage>().unwrap() {
            WorkerMessage::Hello(caps) => assert!(caps.supports(DOUBLE.id())),
            other => panic!("unexpected: {other:?}"),
        }
        match reader.read::<WorkerMessage>().unwrap() {
            WorkerMessage::Completed {
                run_index, payload, ..
            } => {
                assert_eq!(run_index, 4);
                assert_eq!(payload, b"10");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_not_a_worker_by_default() {
        assert!(!is_worker_process());
        // No-op outside a worker
        run_worker_if_requested();
    }
}
