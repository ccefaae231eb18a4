//! Length-Prefixed Frames
//!
//! Each message on a supervisor/worker pipe is a little-endian `u32` byte
//! count followed by that many bytes of rkyv archive:
//!
//! ```text
//! +-----------+-----------------+
//! | len: u32  | archive[len]    |
//! +-----------+-----------------+
//! ```
//!
//! Writers flush after every frame; a worker blocks on its next command
//! right after replying, so a buffered reply would deadlock both ends.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use thiserror::Error;

/// Largest archive accepted in either direction (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const PIPE_BUFFER: usize = 64 * 1024;

/// Failures reading or writing a frame
#[derive(Debug, Error)]
pub enum FrameError {
    /// The pipe itself failed
    #[error("pipe error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be archived
    #[error("cannot encode message: {0}")]
    Encode(String),

    /// The bytes received are not a valid archive of the expected type
    #[error("cannot decode message: {0}")]
    Decode(String),

    /// The length prefix exceeds [`MAX_FRAME_SIZE`]
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    Oversized {
        /// Announced or encoded size
        size: usize,
        /// Limit in force
        max: usize,
    },

    /// The frame or its surroundings violate the protocol
    #[error("protocol violation: {0}")]
    Malformed(String),

    /// The peer closed the pipe between frames
    #[error("peer closed the pipe")]
    Closed,
}

fn check_size(size: usize) -> Result<usize, FrameError> {
    match size {
        0 => Err(FrameError::Malformed("empty frame".to_string())),
        size if size > MAX_FRAME_SIZE => Err(FrameError::Oversized {
            size,
            max: MAX_FRAME_SIZE,
        }),
        size => Ok(size),
    }
}

/// Sending half of a pipe
pub struct FrameWriter<W: Write> {
    inner: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a pipe end
    pub fn new(writer: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(PIPE_BUFFER, writer),
        }
    }

    /// Archive `message` and send it as one flushed frame
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        let archive = rkyv::to_bytes::<_, 256>(message)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        let size = check_size(archive.len())?;

        self.inner.write_all(&(size as u32).to_le_bytes())?;
        self.inner.write_all(&archive)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Receiving half of a pipe
pub struct FrameReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a pipe end
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(PIPE_BUFFER, reader),
        }
    }

    /// Block until the next frame arrives and decode it as `T`.
    ///
    /// A pipe closed before the length prefix yields [`FrameError::Closed`];
    /// one closed inside a frame is an I/O error.
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        let mut prefix = [0u8; 4];
        if let Err(e) = self.inner.read_exact(&mut prefix) {
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => FrameError::Closed,
                _ => FrameError::Io(e),
            });
        }
        let size = check_size(u32::from_le_bytes(prefix) as usize)?;

        // rkyv validation needs an aligned buffer
        let mut archive = AlignedVec::with_capacity(size);
        archive.resize(size, 0);
        self.inner.read_exact(&mut archive)?;

        let archived = rkyv::check_archived_root::<T>(&archive)
            .map_err(|e| FrameError::Decode(e.to_string()))?;
        match archived.deserialize(&mut Infallible) {
            Ok(message) => Ok(message),
            Err(never) => match never {},
        }
    }

    /// Whether a frame (or part of one) is already buffered, so polling the
    /// descriptor would miss it
    pub fn has_buffered_data(&self) -> bool {
        !self.inner.buffer().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FailureKind, SupervisorCommand, WorkerMessage};
    use std::io::Cursor;

    #[test]
    fn test_command_then_reply_on_one_stream() {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer
                .write(&SupervisorCommand::Invoke {
                    run_index: 7,
                    target: "demo::square".to_string(),
                    payload: b"[3]".to_vec(),
                })
                .unwrap();
            writer.write(&SupervisorCommand::Shutdown).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        match reader.read::<SupervisorCommand>().unwrap() {
            SupervisorCommand::Invoke {
                run_index,
                target,
                payload,
            } => {
                assert_eq!(run_index, 7);
                assert_eq!(target, "demo::square");
                assert_eq!(payload, b"[3]");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(matches!(
            reader.read::<SupervisorCommand>().unwrap(),
            SupervisorCommand::Shutdown
        ));
        assert!(matches!(
            reader.read::<SupervisorCommand>(),
            Err(FrameError::Closed)
        ));
    }

    #[test]
    fn test_failure_message_survives_framing() {
        let mut buffer = Vec::new();
        FrameWriter::new(&mut buffer)
            .write(&WorkerMessage::Failed {
                run_index: 2,
                elapsed_nanos: 1_500,
                kind: FailureKind::Panic,
                message: "boom".to_string(),
            })
            .unwrap();

        let decoded: WorkerMessage = FrameReader::new(Cursor::new(buffer)).read().unwrap();
        match decoded {
            WorkerMessage::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::Panic);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_oversized_length_prefix_rejected() {
        let mut buffer = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes().to_vec();
        buffer.extend_from_slice(&[0u8; 8]);
        let result: Result<SupervisorCommand, _> = FrameReader::new(Cursor::new(buffer)).read();
        assert!(matches!(result, Err(FrameError::Oversized { .. })));
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let buffer = 0u32.to_le_bytes().to_vec();
        let result: Result<SupervisorCommand, _> = FrameReader::new(Cursor::new(buffer)).read();
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let mut buffer = 64u32.to_le_bytes().to_vec();
        buffer.extend_from_slice(&[1u8; 10]);
        let result: Result<SupervisorCommand, _> = FrameReader::new(Cursor::new(buffer)).read();
        assert!(matches!(result, Err(FrameError::Io(_))));
    }
}
