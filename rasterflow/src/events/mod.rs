//! Event sink system for run observability.
//!
//! The process manager emits a [`PlanningEvent`] for every run, task and
//! failed stage attempt. Sinks never fail the run.

mod event;
mod sink;

pub use event::{EventKind, PlanningEvent};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
