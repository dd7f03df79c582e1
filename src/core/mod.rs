//! Core infrastructure for analyzer execution

pub mod cancellation;
pub mod localizable;
pub mod options;
pub mod queue;
pub mod suppression;
pub mod types;
pub mod warning_state;

pub use cancellation::{CancellationToken, OperationCanceled};
pub use localizable::{LocalizableErrorHandler, LocalizableString};
pub use options::{matches_pattern, AnalyzerOptions, CompilationOptions};
pub use queue::{AsyncQueue, DequeueError, QueueError};
pub use suppression::{GlobalSuppressions, SuppressMessageAttributeState, SuppressMessageInfo};
pub use types::*;
pub use warning_state::{
    BoundaryKind, LazyWarningStateMap, SuppressionBoundary, WarningStateMap, WarningStateMapEntry,
};
