pub mod project;
pub mod span;
pub mod trace;

pub use project::Project;
pub use span::{LlmUsage, Outcome, SpanKind, SpanRecord, Status};
pub use trace::{Rollups, TraceRecord};
