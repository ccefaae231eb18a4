//! Processes substrate
//!
//! Functions cross the process boundary by registry id, with arguments and
//! results encoded as JSON. See [`process_fn!`](crate::process_fn) and
//! [`run_worker_if_requested`].

mod registry;
#[cfg(unix)]
mod supervisor;
mod worker;

pub use registry::{InvokeError, ProcessFn, ProcessTarget, find_target, registered_targets};
pub use worker::{is_worker_process, run_worker_if_requested};

use crate::error::{RunError, RunErrorKind, TimeitError};
use crate::sample::TimingSample;
use crate::strategy::Execution;
use serde::de::DeserializeOwned;

/// Run a registered target across worker processes, samples still encoded
pub(crate) fn run_encoded(
    exec: &Execution<'_>,
    target: &str,
    payload: &[u8],
) -> Result<Vec<TimingSample<Vec<u8>>>, TimeitError> {
    if find_target(target).is_none() {
        return Err(TimeitError::Serialization {
            target: target.to_string(),
            reason: "only functions registered with process_fn! can run in a worker process"
                .to_string(),
        });
    }

    #[cfg(unix)]
    {
        supervisor::run_sharded(exec, target, payload)
    }
    #[cfg(not(unix))]
    {
        let _ = (exec, payload);
        Err(crate::error::ConfigError::ProcessesUnsupported.into())
    }
}

/// Decode a worker's result; a bad payload fails the run, not the call
pub(crate) fn decode_sample<R: DeserializeOwned>(sample: TimingSample<Vec<u8>>) -> TimingSample<R> {
    let TimingSample {
        index,
        elapsed,
        outcome,
        value,
        error,
    } = sample;

    let (value, error) = match value.map(|bytes| serde_json::from_slice::<R>(&bytes)) {
        Some(Ok(decoded)) => (Some(decoded), error),
        Some(Err(e)) => (
            None,
            Some(RunError::new(
                index,
                RunErrorKind::Serialization,
                format!("failed to decode result: {e}"),
            )),
        ),
        None => (None, error),
    };

    TimingSample {
        index,
        elapsed,
        outcome,
        value,
        error,
    }
}

/// Fold an in-process invocation failure into the sample
pub(crate) fn flatten_invoke(
    sample: TimingSample<Result<Vec<u8>, InvokeError>>,
) -> TimingSample<Vec<u8>> {
    let TimingSample {
        index,
        elapsed,
        outcome,
        value,
        error,
    } = sample;

    match value {
        Some(Ok(bytes)) => TimingSample {
            index,
            elapsed,
            outcome,
            value: Some(bytes),
            error,
        },
        Some(Err(e)) => TimingSample {
            index,
            elapsed,
            outcome,
            value: None,
            error: Some(RunError::new(index, RunErrorKind::Serialization, e.to_string())),
        },
        None => TimingSample {
            index,
            elapsed,
            outcome,
            value: None,
            error,
        },
    }
}
