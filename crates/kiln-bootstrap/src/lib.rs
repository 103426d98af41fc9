//! Bootstrap orchestration for a kiln session.
//!
//! Decides between bootstrapping a new controller and adding a model to a
//! shared one, runs the provisioning task and the spell's post-bootstrap hook
//! as spawned tasks, and funnels every failure through a single-flight error
//! reporter.

mod branch;
mod collaborators;
mod config;
mod engine_cli;
mod error;
mod hook;
mod launcher;
mod readiness;
mod reporter;
mod session;
mod session_bootstrapper;
mod task_queue;
mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use branch::*;
pub use collaborators::*;
pub use config::*;
pub use engine_cli::*;
pub use error::*;
pub use hook::*;
pub use launcher::*;
pub use readiness::*;
pub use reporter::*;
pub use session::*;
pub use session_bootstrapper::*;
pub use task_queue::*;
pub use telemetry::*;
