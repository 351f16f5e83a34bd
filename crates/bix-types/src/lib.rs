pub mod error;
pub mod extract;
pub mod outcome;
pub mod values;
pub mod window;

// Re-exports for convenience
pub use error::{PipelineError, Result};
pub use extract::{ExtractBatch, ExtractRow, DAY_BANDS};
pub use outcome::{DeliveryReceipt, ProcessOutcome, RunSummary};
pub use values::{Measurement, ReportDate};
pub use window::DateWindow;
