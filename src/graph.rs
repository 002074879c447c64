//! Filter-graph construction.
//!
//! [`builder`] is the typed statement layer: pads, labels and validation
//! before anything is serialized to ffmpeg's wire syntax. [`compile`] turns a
//! [`crate::JobSpec`] plus probed durations into a complete
//! [`compile::FilterGraphPlan`].

pub mod builder;
pub mod compile;

pub use builder::{GraphBuilder, InputSpec, Pad, StreamSelector};
pub use compile::{CompileInputs, FilterGraphPlan, MapTarget, compile};
