//! Registry of functions that can run in a worker process
//!
//! A worker is the same executable re-executed, so a function is addressed
//! by a stable string id and looked up in the worker's own registry.
//! Closures have no such id and never cross the boundary.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

/// Type-erased entry point registered through [`process_fn!`](crate::process_fn)
#[derive(Debug)]
pub struct ProcessTarget {
    /// Registered id, `module::path::NAME`
    pub id: &'static str,
    /// Decode arguments, call the function, encode the result
    pub invoke: fn(&[u8]) -> Result<Vec<u8>, InvokeError>,
}

impl ProcessTarget {
    #[doc(hidden)]
    pub const fn new(id: &'static str, invoke: fn(&[u8]) -> Result<Vec<u8>, InvokeError>) -> Self {
        Self { id, invoke }
    }
}

inventory::collect!(ProcessTarget);

/// Argument or result encoding failure at the process boundary
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to decode arguments: {0}")]
    Arguments(#[source] serde_json::Error),

    #[error("failed to encode result: {0}")]
    Result(#[source] serde_json::Error),
}

/// Look up a registered target by exact id
pub fn find_target(id: &str) -> Option<&'static ProcessTarget> {
    inventory::iter::<ProcessTarget>
        .into_iter()
        .find(|target| target.id == id)
}

/// All registered targets, sorted by id
pub fn registered_targets() -> Vec<&'static ProcessTarget> {
    let mut targets: Vec<_> = inventory::iter::<ProcessTarget>.into_iter().collect();
    targets.sort_by_key(|target| target.id);
    targets
}

/// Typed handle to a registered function
pub struct ProcessFn<A, R> {
    id: &'static str,
    func: fn(A) -> R,
}

impl<A, R> ProcessFn<A, R> {
    #[doc(hidden)]
    pub const fn new(id: &'static str, func: fn(A) -> R) -> Self {
        Self { id, func }
    }

    /// Registered id
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Call the function in the current process
    pub fn call_local(&self, args: A) -> R {
        (self.func)(args)
    }

    /// Whether this handle is present in the registry.
    ///
    /// A handle built by hand rather than through `process_fn!` is not.
    pub fn is_registered(&self) -> bool {
        find_target(self.id).is_some()
    }
}

impl<A: DeserializeOwned, R: Serialize> ProcessFn<A, R> {
    /// Decode JSON arguments, call, encode the JSON result
    pub fn invoke_encoded(&self, payload: &[u8]) -> Result<Vec<u8>, InvokeError> {
        let args: A = serde_json::from_slice(payload).map_err(InvokeError::Arguments)?;
        let result = (self.func)(args);
        serde_json::to_vec(&result).map_err(InvokeError::Result)
    }
}

impl<A, R> fmt::Debug for ProcessFn<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessFn").field("id", &self.id).finish()
    }
}

/// Register a function for the processes substrate.
///
/// Declares a `static` [`ProcessFn`] handle and submits the matching
/// [`ProcessTarget`] to the registry. Several parameters are passed as a
/// tuple.
///
/// ```ignore
/// fn checksum((data, rounds): (Vec<u8>, u32)) -> u64 { /* ... */ }
///
/// timeit::process_fn! {
///     pub static CHECKSUM: fn((Vec<u8>, u32)) -> u64 = checksum;
/// }
/// ```
#[macro_export]
macro_rules! process_fn {
    ($(#[$meta:meta])* $vis:vis static $name:ident : fn($arg:ty) -> $ret:ty = $func:expr;) => {
        $(#[$meta])*
        $vis static $name: $crate::process::ProcessFn<$arg, $ret> = $crate::process::ProcessFn::new(
            ::core::concat!(::core::module_path!(), "::", ::core::stringify!($name)),
            $func,
        );

        $crate::__private::inventory::submit! {
            $crate::process::ProcessTarget::new(
                ::core::concat!(::core::module_path!(), "::", ::core::stringify!($name)),
                {
                    fn invoke(
                        payload: &[u8],
                    ) -> ::core::result::Result<::std::vec::Vec<u8>, $crate::process::InvokeError>
                    {
                        $name.invoke_encoded(payload)
                    }
                    invoke
                },
            )
        }
    };
}
