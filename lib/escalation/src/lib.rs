//! Deadline tracking and escalation for the cargolink workflow engine.
//!
//! Suspended nodes with a deadline policy are registered in a due index.
//! A periodic sweep fires reminders while a node keeps waiting and takes the
//! node's timeout edge when the deadline expires, handing control back to
//! the workflow graph instead of deciding anything itself.

pub mod due;
pub mod error;
pub mod sweep;

pub use due::{DeadlineRegistrar, DueEntry, DueIndexStore, DueKind, InMemoryDueIndex};
pub use error::EscalationError;
pub use sweep::{EscalationNotifier, SweepReport, Sweeper};
