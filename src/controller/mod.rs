//! WorkloadSchedule reconciliation
//!
//! A reconcile pass runs, in order:
//! 1. lifecycle (finalizer add/remove, stops the pass when it acts)
//! 2. target namespace creation
//! 3. time lookup for the schedule's timezone
//! 4. active-window evaluation
//! 5. Deployment scaling
//! 6. status and condition write

pub mod cluster;
pub mod conditions;
pub mod lifecycle;
pub mod scaling;
pub mod schedule;
pub mod time_source;
pub mod window;

pub use schedule::{
    error_policy, reconcile, reconcile_schedule, spec_changes, Context, ReconcileError,
};
