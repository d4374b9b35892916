//! Initiative Consistency Manager
//!
//! Task membership is stored twice: as `task.initiative_id` and as the
//! initiative's junction list. [`LinkRegistry`] is the only writer of both.
//! [`completion`] derives initiative completion from member task status.

pub mod completion;
mod registry;

pub use completion::{Completion, CompletionTracker, StatusSource, evaluate_completion};
pub use registry::{LinkOutcome, LinkRegistry, MissingTaskPolicy, ReconcileReport};
