//! slipway deployd
//!
//! The control plane that keeps cluster workloads in sync with the
//! manifest repository and mediates image rollouts. The release engine
//! plans and executes releases; around it sit a FIFO job queue with a
//! single worker, an automation loop, a history log, and the server
//! facade that exposes the public operations.
//!
//! The cluster driver, image registry client, and git client are
//! external collaborators reached through the `platform`, `registry`,
//! and `repo` ports.

pub mod automator;
pub mod config;
pub mod db;
pub mod history;
pub mod jobs;
pub mod manifests;
pub mod platform;
pub mod registry;
pub mod release;
pub mod repo;
pub mod server;
