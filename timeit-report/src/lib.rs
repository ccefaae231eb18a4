#![warn(missing_docs)]
//! timeit Report
//!
//! The reporting side of a timed call:
//! - [`ReportEvent`]: everything the engine has to say, with the exact line
//!   each event renders to
//! - [`Reporter`]: where events go; the default forwards to `tracing`
//! - Plain two-column tables for detailed output, and JSON for machines

mod event;
mod json;
mod reporter;
mod summary;
mod table;

pub use event::ReportEvent;
pub use json::generate_json_summary;
pub use reporter::{
    DEFAULT_LOG_FILTER, LOG_ENV, MemoryReporter, RecordedEvent, Reporter, TracingReporter,
    default_reporter, init_tracing,
};
pub use summary::RunSummary;
pub use table::render_table;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// The run summary as JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
