//! Bridge Iteration Engine (spec §4.7): the phase-graph orchestrator that
//! sequences sprint execution, multi-model review, vision capture, and the
//! convergence predicate into a resumable, observable loop.
//!
//! This crate wires together every satellite facility the rest of the
//! workspace ships (`bridge-state`, `bridge-vision`, `bridge-reviewer`,
//! `bridge-events`, ...) behind one entry point; it never invokes a model
//! directly, only emitting `SIGNAL:...` lines an external dispatcher acts
//! on (see [`signal`] and [`dispatcher`]).

pub mod convergence;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod signal;

pub use dispatcher::{Dispatcher, NullDispatcher, SprintOutcome};
pub use engine::{PreflightReport, Reporter, RuntimeOptions, interrupt, run, run_preflight, run_resume, wait_for_sentinel};
pub use error::BridgeError;
pub use signal::Signal;
