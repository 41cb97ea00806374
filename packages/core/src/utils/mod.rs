//! Utility functions for the annotation core
//!
//! - `swc` - SWC skeleton file parsing, writing and neuron conversion
//! - `progress` - progress reporting and cancellation for long-running jobs

pub mod progress;
pub mod swc;

pub use progress::{CancelFlag, Progress, ProgressReporter};
pub use swc::{SwcData, SwcError, SwcNode};
