pub mod batch;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod executor;
pub mod options;
pub mod output;
mod scope;

pub use batch::{JobResult, MergeJob, run_batch};
pub use cancel::CancelToken;
pub use engine::{MergeEngine, MergeOutcome, RecordScope};
pub use error::{MergeError, MergeWarning};
pub use executor::SourceExecutor;
pub use options::{BatchOptions, DEFAULT_SOURCE_TIMEOUT_MS, MergeOptions};
pub use output::{OutputGroup, OutputNode, OutputText, OutputTree};
