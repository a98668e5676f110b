//! The release engine and its surroundings.
//!
//! Planning and execution are split: a plan is data (an ordered list of
//! tagged [`ReleaseAction`]s, printable and inspectable), and a single
//! executor interprets it against a per-job [`ReleaseContext`]. The
//! [`ReleaseWorker`] drains the job queue one job at a time.

mod context;
mod engine;
mod plan;
mod worker;

pub use context::ReleaseContext;
pub use engine::{JobSink, ReleaseError, Releaser};
pub use plan::{ActionKind, ContainerRegrade, ReleaseAction};
pub use worker::ReleaseWorker;
