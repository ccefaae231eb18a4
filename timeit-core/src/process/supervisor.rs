//! Worker pool for the processes substrate
//!
//! Workers are the current executable re-executed with the command pipe on
//! fd 3 and the message pipe on fd 4. Runs are sharded round-robin over the
//! workers and each shard is driven from its own rayon thread. A worker that
//! dies fails its in-flight run and is replaced for the rest of its shard.

use crate::error::{RunError, RunErrorKind, SupervisorError};
use crate::sample::TimingSample;
use crate::strategy::Execution;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::env;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use timeit_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, IPC_FD_ENV, SupervisorCommand,
    WORKER_COMMAND_FD, WORKER_MESSAGE_FD, WorkerCapabilities, WorkerMessage,
};

/// How long a fresh worker gets to say Hello
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness is re-checked at least this often while waiting for a reply
const POLL_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

fn wait_for_data(fd: RawFd, timeout: Duration) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(std::io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // Readable even if the writer is gone: drain what is there first
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a close-on-exec pipe, returning (read_fd, write_fd)
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for &fd in &fds {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// One live worker process
pub(crate) struct WorkerHandle {
    child: Child,
    reader: FrameReader<std::fs::File>,
    writer: FrameWriter<std::fs::File>,
    msg_read_fd: RawFd,
    capabilities: WorkerCapabilities,
}

impl WorkerHandle {
    /// Re-execute the current binary as a worker and complete the handshake
    pub(crate) fn spawn() -> Result<Self, SupervisorError> {
        let binary = env::current_exe()?;

        let (cmd_read, cmd_write) = create_pipe()?;
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::Spawn(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .env(
                IPC_FD_ENV,
                format!("{WORKER_COMMAND_FD},{WORKER_MESSAGE_FD}"),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        // In the child: move the pipe ends onto the agreed descriptors and let
        // them survive exec. Only async-signal-safe calls here.
        unsafe {
            command.pre_exec(move || {
                if cmd_read != WORKER_COMMAND_FD {
                    libc::dup2(cmd_read, WORKER_COMMAND_FD);
                    libc::close(cmd_read);
                }
                let flags = libc::fcntl(WORKER_COMMAND_FD, libc::F_GETFD);
                libc::fcntl(WORKER_COMMAND_FD, libc::F_SETFD, flags & !libc::FD_CLOEXEC);

                if msg_write != WORKER_MESSAGE_FD {
                    libc::dup2(msg_write, WORKER_MESSAGE_FD);
                    libc::close(msg_write);
                }
                let flags = libc::fcntl(WORKER_MESSAGE_FD, libc::F_GETFD);
                libc::fcntl(WORKER_MESSAGE_FD, libc::F_SETFD, flags & !libc::FD_CLOEXEC);

                libc::close(cmd_write);
                libc::close(msg_read);
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::Spawn(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        // SAFETY: both descriptors were just created by `create_pipe` and the
        // child-side ends are closed; the files take sole ownership.
        let writer_file = unsafe { std::fs::File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { std::fs::File::from_raw_fd(msg_read) };

        let mut handle = Self {
            child,
            reader: FrameReader::new(reader_file),
            writer: FrameWriter::new(writer_file),
            msg_read_fd: msg_read,
            capabilities: WorkerCapabilities::current(Vec::new()),
        };
        handle.capabilities = handle.wait_for_hello()?;

        tracing::debug!(pid = handle.pid(), "worker ready");
        Ok(handle)
    }

    fn wait_for_hello(&mut self) -> Result<WorkerCapabilities, SupervisorError> {
        match self.read_message(Some(HANDSHAKE_TIMEOUT))? {
            WorkerMessage::Hello(caps) if caps.protocol_version == timeit_ipc::PROTOCOL_VERSION => {
                Ok(caps)
            }
            WorkerMessage::Hello(caps) => Err(SupervisorError::Protocol {
                expected: format!("protocol version {}", timeit_ipc::PROTOCOL_VERSION),
                got: format!("protocol version {}", caps.protocol_version),
            }),
            other => Err(SupervisorError::Protocol {
                expected: "Hello".to_string(),
                got: format!("{other:?}"),
            }),
        }
    }

    pub(crate) fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Fail unless the worker registered `target`
    pub(crate) fn require_target(&self, target: &str) -> Result<(), SupervisorError> {
        if self.capabilities.supports(target) {
            Ok(())
        } else {
            Err(SupervisorError::MissingTarget {
                pid: self.pid(),
                target: target.to_string(),
            })
        }
    }

    /// Execute one run and wait for its reply
    pub(crate) fn invoke(
        &mut self,
        index: usize,
        target: &str,
        payload: &[u8],
    ) -> Result<TimingSample<Vec<u8>>, SupervisorError> {
        let run_index = u32::try_from(index).unwrap_or(u32::MAX);
        self.writer.write(&SupervisorCommand::Invoke {
            run_index,
            target: target.to_string(),
            payload: payload.to_vec(),
        })?;

        match self.read_message(None)? {
            WorkerMessage::Completed {
                run_index: reply,
                elapsed_nanos,
                payload,
            } if reply == run_index => Ok(TimingSample::completed(
                index,
                Duration::from_nanos(elapsed_nanos),
                payload,
            )),
            WorkerMessage::Failed {
                run_index: reply,
                elapsed_nanos,
                kind,
                message,
            } if reply == run_index => {
                let kind = match kind {
                    FailureKind::Panic => RunErrorKind::Panic,
                    FailureKind::Serialization | FailureKind::UnknownTarget => {
                        RunErrorKind::Serialization
                    }
                };
                Ok(TimingSample::failed(
                    index,
                    Duration::from_nanos(elapsed_nanos),
                    RunError::new(index, kind, message),
                ))
            }
            other => Err(SupervisorError::Protocol {
                expected: format!("reply to run {run_index}"),
                got: format!("{other:?}"),
            }),
        }
    }

    /// Wait for the next message, checking liveness between polls.
    ///
    /// `limit` bounds the total wait; runs themselves are unbounded because
    /// enforced deadlines never apply to this substrate.
    fn read_message(&mut self, limit: Option<Duration>) -> Result<WorkerMessage, SupervisorError> {
        let start = Instant::now();

        while !self.reader.has_buffered_data() {
            let slice = match limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(start.elapsed());
                    if remaining.is_zero() {
                        return Err(SupervisorError::Timeout(limit));
                    }
                    remaining.min(POLL_SLICE)
                }
                None => POLL_SLICE,
            };

            match wait_for_data(self.msg_read_fd, slice) {
                PollResult::DataAvailable => break,
                PollResult::Timeout => {
                    if !self.is_alive() {
                        return Err(SupervisorError::WorkerExited(
                            "worker process exited unexpectedly".to_string(),
                        ));
                    }
                }
                PollResult::PipeClosed => {
                    return Err(SupervisorError::WorkerExited(
                        "worker pipe closed unexpectedly".to_string(),
                    ));
                }
                PollResult::Error(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                PollResult::Error(e) => return Err(SupervisorError::Spawn(e)),
            }
        }

        match self.reader.read::<WorkerMessage>() {
            Ok(message) => Ok(message),
            Err(FrameError::Closed) => Err(SupervisorError::WorkerExited(
                "worker closed its pipe".to_string(),
            )),
            Err(e) if !self.is_alive() => Err(SupervisorError::WorkerExited(format!(
                "worker died mid-frame: {e}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the worker to exit and reap it
    pub(crate) fn shutdown(mut self) {
        if self.writer.write(&SupervisorCommand::Shutdown).is_ok() {
            let _ = self.child.wait();
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            // SIGTERM first, brief grace period, then SIGKILL
            let _ = send_sigterm(self.child.id());
            std::thread::sleep(Duration::from_millis(50));
            if self.is_alive() {
                let _ = self.child.kill();
            }
        }
        let _ = self.child.wait();
    }
}

/// Run every sample of one call on a fresh pool of worker processes.
///
/// Fails only if a shard's first worker cannot be started; later failures
/// become failed samples.
pub(crate) fn run_sharded(
    exec: &Execution<'_>,
    target: &str,
    payload: &[u8],
) -> Result<Vec<TimingSample<Vec<u8>>>, crate::error::TimeitError> {
    let worker_count = exec.workers.max(1);
    let mut shards: Vec<Vec<usize>> = vec![Vec::new(); worker_count];
    for index in 0..exec.runs {
        shards[index % worker_count].push(index);
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|i| format!("timeit-supervisor-{i}"))
        .build()?;

    tracing::debug!(
        function = exec.name,
        process_fn = target,
        runs = exec.runs,
        workers = worker_count,
        "starting worker processes"
    );

    let shard_results: Vec<Result<Vec<TimingSample<Vec<u8>>>, SupervisorError>> =
        pool.install(|| {
            shards
                .into_par_iter()
                .map(|shard| run_shard(exec, target, payload, &shard))
                .collect()
        });

    let mut samples = Vec::with_capacity(exec.runs);
    for result in shard_results {
        samples.extend(result?);
    }
    samples.sort_by_key(|sample| sample.index);
    Ok(samples)
}

fn run_shard(
    exec: &Execution<'_>,
    target: &str,
    payload: &[u8],
    indices: &[usize],
) -> Result<Vec<TimingSample<Vec<u8>>>, SupervisorError> {
    let first = WorkerHandle::spawn()?;
    first.require_target(target)?;

    let mut worker = Some(first);
    let mut samples = Vec::with_capacity(indices.len());

    for &index in indices {
        let mut handle = match worker.take() {
            Some(handle) => handle,
            None => match WorkerHandle::spawn() {
                Ok(handle) => handle,
                Err(e) => {
                    samples.push(TimingSample::failed(
                        index,
                        Duration::ZERO,
                        RunError::new(index, RunErrorKind::WorkerLost, e.to_string()),
                    ));
                    continue;
                }
            },
        };

        let started = Instant::now();
        match handle.invoke(index, target, payload) {
            Ok(sample) => {
                samples.push(exec.policy.settle(sample, exec));
                worker = Some(handle);
            }
            Err(e) => {
                tracing::warn!(
                    function = exec.name,
                    index,
                    pid = handle.pid(),
                    error = %e,
                    "worker lost, replacing"
                );
                let elapsed = started.elapsed();
                drop(handle);
                samples.push(exec.policy.settle(
                    TimingSample::failed(
                        index,
                        elapsed,
                        RunError::new(index, RunErrorKind::WorkerLost, e.to_string()),
                    ),
                    exec,
                ));
            }
        }
    }

    if let Some(handle) = worker {
        handle.shutdown();
    }
    Ok(samples)
}
