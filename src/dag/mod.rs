// src/dag/mod.rs

//! Tasks and the order they run in.
//!
//! A [`TaskRegistry`] owns the named definitions and turns a request into an
//! [`ExecutionPlan`]. The [`Scheduler`] walks the same graph one run at a
//! time: it hands out tasks whose dependencies succeeded and records what
//! failed or was skipped. [`state_manager`] holds the per-run transitions.

pub mod graph;
pub mod registry;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::DagGraph;
pub use registry::{ExecutionPlan, TaskDefinition, TaskRegistry};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{LastRun, ScheduledTask, TaskRunState};
