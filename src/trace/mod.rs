//! Reference tracing: single-repo usage search and the multi-project
//! composition that produces cross-repo impacts.

pub mod multi_project;
pub mod usage_tracer;

pub use multi_project::MultiProjectTracer;
pub use usage_tracer::UsageTracer;
