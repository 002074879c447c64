//! Supervision of external encoder processes.
//!
//! [`registry`] tracks every spawned child so a shutdown hook can terminate
//! stragglers; [`supervisor`] runs one invocation to completion while
//! streaming its progress channel and enforcing stall/cancel semantics.

pub mod registry;
pub mod supervisor;

pub use registry::ProcessRegistry;
pub use supervisor::{ProcessOutcome, StallPolicy, Supervisor};
