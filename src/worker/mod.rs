//! Execution of requested runs.
//!
//! - **Supervision**: waits until a job or report may start, then records
//!   its result
//! - **Launching**: builds the external command line and spawns the process
//!
//! # Run flow
//!
//! 1. [`RunSupervisor::activate`] marks an idle entity as start-requested
//! 2. The supervisor polls the start status every check interval; unfinished
//!    dependencies consume the retry budget, an unreached schedule does not
//! 3. On `CanStart` the entity is marked running and [`ProcessLauncher`]
//!    spawns the runner (jobs) or renderer (reports), logging to
//!    `<logs_dir>/<id>_<yyyyMMddHHmmss>.log`
//! 4. The exit code is written back and the entity becomes finished

pub mod executor;
pub mod supervisor;

pub use executor::{LaunchSpec, ProcessLauncher};
pub use supervisor::{Activation, RunOutcome, RunSupervisor};
